//! Cooperative cancellation shared by workers, the sink and the reporter.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CancelReason {
    /// Interrupt or termination signal
    Interrupted = 1,
    /// A rule marked `final` matched
    FinalMatch = 2,
    /// The caller's time limit elapsed
    Deadline = 3,
}

impl CancelReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CancelReason::Interrupted),
            2 => Some(CancelReason::FinalMatch),
            3 => Some(CancelReason::Deadline),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Interrupted => write!(f, "interrupted"),
            CancelReason::FinalMatch => write!(f, "final match reached"),
            CancelReason::Deadline => write!(f, "deadline reached"),
        }
    }
}

struct Inner {
    /// 0 while running, otherwise the `CancelReason` that won
    reason: AtomicU8,
    /// Dropped on cancel, which disconnects `done`
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

/// A cloneable, fire-once cancellation signal.
///
/// The first call to [`cancel`](CancelToken::cancel) wins: it records its
/// reason and wakes everything blocked on [`done`](CancelToken::done).
/// Later calls are no-ops.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                reason: AtomicU8::new(0),
                trigger: Mutex::new(Some(trigger)),
                done,
            }),
        }
    }

    /// Cancels with `reason`. Returns `true` only for the call that
    /// performed the transition.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let won = self
            .inner
            .reason
            .compare_exchange(0, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            let mut trigger = self
                .inner
                .trigger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            trigger.take();
        }
        won
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.load(Ordering::Acquire) != 0
    }

    /// The reason recorded by the winning `cancel` call.
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_u8(self.inner.reason.load(Ordering::Acquire))
    }

    /// A channel that never yields a message and disconnects on cancel.
    ///
    /// Meant for `crossbeam_channel::select!` next to a blocking operation.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Sleeps up to `timeout`, returning early with `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_cancelled(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_first_cancel_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel(CancelReason::FinalMatch));
        assert!(!token.cancel(CancelReason::Interrupted));
        assert_eq!(token.reason(), Some(CancelReason::FinalMatch));
    }

    #[test]
    fn test_concurrent_cancel_fires_once() {
        let token = CancelToken::new();
        let winners: usize = (0..16)
            .map(|_| {
                let token = token.clone();
                thread::spawn(move || token.cancel(CancelReason::FinalMatch))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_done_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.done().recv().is_err())
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel(CancelReason::Interrupted);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));

        token.cancel(CancelReason::Deadline);
        assert!(token.wait_timeout(Duration::from_secs(10)));
    }
}
