//! Run lifecycle: start workers, sink and reporter, then shut them down in order.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, Sender};

use super::{CancelReason, CancelToken, ProgressReporter};
use crate::matcher::RuleSet;
use crate::pipeline::{Console, EventSink, KeystoreSealer, RecordStore, Redactor, SinkReport};
use crate::worker::{CandidateSource, WorkerContext, WorkerPool, WorkerStats};

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Lifecycle of a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    Cancelling = 1,
    Draining = 2,
    Stopped = 3,
}

/// Shared, read-only view of a run's [`RunState`].
#[derive(Debug, Clone, Default)]
pub struct RunStatus(Arc<AtomicU8>);

impl RunStatus {
    pub fn state(&self) -> RunState {
        match self.0.load(Ordering::Acquire) {
            0 => RunState::Running,
            1 => RunState::Cancelling,
            2 => RunState::Draining,
            _ => RunState::Stopped,
        }
    }

    fn advance(&self, to: RunState) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The candidate source ran dry
    Exhausted,
    Interrupted,
    Deadline,
    FinalMatch,
}

impl From<CancelReason> for StopReason {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Interrupted => StopReason::Interrupted,
            CancelReason::FinalMatch => StopReason::FinalMatch,
            CancelReason::Deadline => StopReason::Deadline,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "input exhausted"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::Deadline => write!(f, "deadline reached"),
            StopReason::FinalMatch => write!(f, "final match reached"),
        }
    }
}

/// Aggregate statistics returned by a stopped run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub attempts: u64,
    pub matches: u64,
    pub errors: u64,
    pub persisted: u64,
    pub failed_writes: u64,
    pub elapsed: Duration,
    pub reason: StopReason,
}

impl RunStats {
    /// Average attempts per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Tunables of a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    /// Event queue capacity; `None` means four slots per worker
    pub queue_capacity: Option<usize>,
    pub report_interval: Duration,
    /// Cancel the run after this long
    pub deadline: Option<Duration>,
    /// Encrypt matches into keystores before they are queued
    pub sealer: Option<KeystoreSealer>,
}

impl RunOptions {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: None,
            report_interval: Duration::from_secs(10),
            deadline: None,
            sealer: None,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(self.workers.saturating_mul(4))
            .max(1)
    }
}

/// Owns the cancellation signal and the ordered shutdown of a run.
pub struct RunController {
    rules: Arc<RuleSet>,
    source: Arc<dyn CandidateSource>,
    store: Box<dyn RecordStore>,
    console: Arc<dyn Console>,
    redactor: Redactor,
    options: RunOptions,
    cancel: CancelToken,
    status: RunStatus,
}

impl RunController {
    pub fn new(
        rules: Arc<RuleSet>,
        source: Arc<dyn CandidateSource>,
        store: Box<dyn RecordStore>,
        console: Arc<dyn Console>,
        redactor: Redactor,
        options: RunOptions,
    ) -> Self {
        Self {
            rules,
            source,
            store,
            console,
            redactor,
            options,
            cancel: CancelToken::new(),
            status: RunStatus::default(),
        }
    }

    /// The token interrupts should cancel.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.status.clone()
    }

    /// Runs until the source is exhausted or the run is cancelled.
    ///
    /// Shutdown order: workers are joined, then the sink drains the closed
    /// queue, then the reporter is stopped. Returns only after all three
    /// have terminated.
    pub fn run(self) -> Result<RunStats, RunError> {
        let RunController {
            rules,
            source,
            store,
            console,
            redactor,
            options,
            cancel,
            status,
        } = self;

        if options.workers == 0 {
            return Err(RunError::NoWorkers);
        }

        let capacity = options.queue_capacity();
        let start = Instant::now();
        let stats = Arc::new(WorkerStats::new());
        let (events_tx, events_rx) = bounded(capacity);

        let sink = EventSink::new(events_rx, store, console.clone(), redactor, cancel.clone());
        let sink_handle = thread::Builder::new()
            .name("vanity-sink".into())
            .spawn(move || sink.run())
            .map_err(RunError::Spawn)?;

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let reporter = ProgressReporter::new(
            stats.clone(),
            console.clone(),
            cancel.clone(),
            options.report_interval,
            start,
        );
        let reporter_handle = match thread::Builder::new()
            .name("vanity-reporter".into())
            .spawn(move || reporter.run(stop_rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                drop(events_tx);
                join_sink(sink_handle);
                return Err(RunError::Spawn(e));
            }
        };

        let ctx = WorkerContext {
            rules,
            source,
            cancel: cancel.clone(),
            stats: stats.clone(),
            sealer: options.sealer.map(Arc::new),
            start,
        };
        let pool = match WorkerPool::spawn(options.workers, ctx, events_tx) {
            Ok(pool) => pool,
            Err(e) => {
                join_sink(sink_handle);
                stop_reporter(stop_tx, reporter_handle);
                return Err(e);
            }
        };

        tracing::info!(
            workers = options.workers,
            queue = capacity,
            deadline = ?options.deadline,
            "search started"
        );

        supervise(&pool, &cancel, &status, options.deadline);

        if cancel.is_cancelled() {
            status.advance(RunState::Cancelling);
        }
        pool.join();

        status.advance(RunState::Draining);
        let report = join_sink(sink_handle);
        stop_reporter(stop_tx, reporter_handle);
        status.advance(RunState::Stopped);

        let reason = cancel
            .reason()
            .map(StopReason::from)
            .unwrap_or(StopReason::Exhausted);

        Ok(RunStats {
            attempts: stats.total_attempts(),
            matches: stats.total_matches(),
            errors: stats.total_errors(),
            persisted: report.persisted,
            failed_writes: report.failed,
            elapsed: start.elapsed(),
            reason,
        })
    }
}

/// Waits until every worker has exited, firing the deadline on the way.
fn supervise(
    pool: &WorkerPool,
    cancel: &CancelToken,
    status: &RunStatus,
    deadline: Option<Duration>,
) {
    let deadline = deadline.map(after).unwrap_or_else(never);

    loop {
        select! {
            recv(pool.exited()) -> _ => return,
            recv(cancel.done()) -> _ => break,
            recv(deadline) -> _ => {
                cancel.cancel(CancelReason::Deadline);
            }
        }
    }

    status.advance(RunState::Cancelling);
    if let Some(reason) = cancel.reason() {
        tracing::info!(%reason, "cancelling workers");
    }
    // workers observe the token at their next checkpoint
    let _ = pool.exited().recv();
}

fn join_sink(handle: JoinHandle<SinkReport>) -> SinkReport {
    handle.join().unwrap_or_else(|_| {
        tracing::error!("event sink panicked");
        SinkReport::default()
    })
}

fn stop_reporter(stop: Sender<()>, handle: JoinHandle<u64>) {
    drop(stop);
    if handle.join().is_err() {
        tracing::error!("progress reporter panicked");
    }
}
