//! Single consumer of the event queue.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::{Console, FoundEvent, RecordStore, Redactor};
use crate::run::{CancelReason, CancelToken};

/// Outcome of a drained pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    /// Events written to the record store
    pub persisted: u64,
    /// Events the store rejected
    pub failed: u64,
    /// Final events seen, including those that arrived after the first
    pub finals: u64,
}

/// Persists, echoes and inspects every found event.
pub struct EventSink {
    events: Receiver<FoundEvent>,
    store: Box<dyn RecordStore>,
    console: Arc<dyn Console>,
    redactor: Redactor,
    cancel: CancelToken,
}

impl EventSink {
    pub fn new(
        events: Receiver<FoundEvent>,
        store: Box<dyn RecordStore>,
        console: Arc<dyn Console>,
        redactor: Redactor,
        cancel: CancelToken,
    ) -> Self {
        Self {
            events,
            store,
            console,
            redactor,
            cancel,
        }
    }

    /// Drains the queue until every sender is gone.
    ///
    /// The loop ends only on disconnect, so events queued before the last
    /// worker exits are always handled.
    pub fn run(mut self) -> SinkReport {
        let mut report = SinkReport::default();

        for event in self.events.iter() {
            match self.store.append(&event) {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        address = %event.account().address,
                        kind = %event.result.kind,
                        error = %self.redactor.mask(&e.to_string()),
                        "record append failed"
                    );
                }
            }

            self.console.found(&self.redactor.echo(&event));

            if event.is_final() {
                report.finals += 1;
                if self.cancel.cancel(CancelReason::FinalMatch) {
                    self.console.notice("final reached, stop all workers");
                }
            }
        }

        tracing::debug!(
            persisted = report.persisted,
            failed = report.failed,
            "event sink drained"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::*;
    use crate::crypto::Keypair;
    use crate::matcher::{MatchResult, RuleKind};
    use crate::pipeline::RecordingConsole;
    use crate::pipeline::{Candidate, StoreError};
    use crate::worker::Account;

    #[derive(Clone, Default)]
    struct SharedStore {
        events: Arc<Mutex<Vec<FoundEvent>>>,
        reject_kind: Option<RuleKind>,
    }

    impl RecordStore for SharedStore {
        fn append(&mut self, event: &FoundEvent) -> Result<(), StoreError> {
            if Some(event.result.kind) == self.reject_kind {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(kind: RuleKind, is_final: bool) -> FoundEvent {
        FoundEvent::new(
            Candidate {
                account: Account::from_keypair(&Keypair::generate().unwrap()),
                attempt: 1,
                elapsed: Duration::ZERO,
            },
            MatchResult {
                kind,
                index: 0,
                is_final,
            },
        )
    }

    #[test]
    fn test_all_finals_persisted_cancel_once() {
        let (tx, rx) = bounded(8);
        let store = SharedStore::default();
        let console = Arc::new(RecordingConsole::default());
        let cancel = CancelToken::new();

        for _ in 0..3 {
            tx.send(event(RuleKind::Specific, true)).unwrap();
        }
        tx.send(event(RuleKind::Edges, false)).unwrap();
        drop(tx);

        let report = EventSink::new(
            rx,
            Box::new(store.clone()),
            console.clone(),
            Redactor::new(true),
            cancel.clone(),
        )
        .run();

        assert_eq!(report.persisted, 4);
        assert_eq!(report.finals, 3);
        assert_eq!(store.events.lock().unwrap().len(), 4);
        assert_eq!(cancel.reason(), Some(CancelReason::FinalMatch));
        assert_eq!(console.notices.lock().unwrap().len(), 1);

        let echoes = console.found.lock().unwrap();
        assert_eq!(echoes.len(), 4);
        assert!(echoes.iter().all(|e| e.private_key == crate::pipeline::REDACTED));
    }

    #[test]
    fn test_store_failure_is_not_fatal() {
        let (tx, rx) = bounded(4);
        let store = SharedStore {
            reject_kind: Some(RuleKind::Regexp),
            ..Default::default()
        };
        tx.send(event(RuleKind::Regexp, false)).unwrap();
        tx.send(event(RuleKind::Symmetric, false)).unwrap();
        drop(tx);

        let report = EventSink::new(
            rx,
            Box::new(store.clone()),
            Arc::new(RecordingConsole::default()),
            Redactor::new(false),
            CancelToken::new(),
        )
        .run();

        assert_eq!(report.failed, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.finals, 0);
    }

    #[test]
    fn test_final_after_interrupt_keeps_reason() {
        let (tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        cancel.cancel(CancelReason::Interrupted);
        tx.send(event(RuleKind::Symmetric, true)).unwrap();
        drop(tx);

        let console = Arc::new(RecordingConsole::default());
        let report = EventSink::new(
            rx,
            Box::new(SharedStore::default()),
            console.clone(),
            Redactor::new(false),
            cancel.clone(),
        )
        .run();

        assert_eq!(report.persisted, 1);
        assert_eq!(cancel.reason(), Some(CancelReason::Interrupted));
        assert!(console.notices.lock().unwrap().is_empty());
    }
}
