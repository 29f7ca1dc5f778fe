//! Worker pool management.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::matcher::RuleSet;
use crate::pipeline::{FoundEvent, KeystoreSealer};
use crate::run::{CancelReason, CancelToken, RunError};

use super::cpu::{CpuWorker, WorkerStats};
use super::source::CandidateSource;

/// Everything a worker shares with its siblings.
#[derive(Clone)]
pub struct WorkerContext {
    pub rules: Arc<RuleSet>,
    pub source: Arc<dyn CandidateSource>,
    pub cancel: CancelToken,
    pub stats: Arc<WorkerStats>,
    pub sealer: Option<Arc<KeystoreSealer>>,
    pub start: Instant,
}

/// A fixed set of named worker threads feeding one event queue.
pub struct WorkerPool {
    /// Number of workers
    num_workers: usize,
    /// Worker thread handles (Option to allow taking during join)
    handles: Option<Vec<JoinHandle<()>>>,
    /// Disconnects once every worker thread has returned
    exited: Receiver<()>,
    cancel: CancelToken,
}

impl WorkerPool {
    /// Spawns `num_workers` threads.
    ///
    /// `events` is moved into the pool and only cloned into workers, so the
    /// queue closes as soon as the last worker exits. If a thread cannot be
    /// spawned the run is cancelled, the started workers are joined and the
    /// error is returned.
    pub fn spawn(
        num_workers: usize,
        ctx: WorkerContext,
        events: Sender<FoundEvent>,
    ) -> Result<Self, RunError> {
        let (exit_tx, exited) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            let worker = CpuWorker::new(
                id,
                ctx.rules.clone(),
                ctx.source.clone(),
                events.clone(),
                ctx.cancel.clone(),
                ctx.stats.clone(),
                ctx.sealer.clone(),
                ctx.start,
            );
            let exit_tx = exit_tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("vanity-worker-{}", id))
                .spawn(move || {
                    let _exit = exit_tx;
                    worker.run();
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    ctx.cancel.cancel(CancelReason::Interrupted);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(RunError::Spawn(e));
                }
            }
        }

        // Drop the originals so the channels close when all workers finish
        drop(events);
        drop(exit_tx);

        Ok(Self {
            num_workers,
            handles: Some(handles),
            exited,
            cancel: ctx.cancel,
        })
    }

    /// A channel that disconnects once every worker has returned.
    pub fn exited(&self) -> &Receiver<()> {
        &self.exited
    }

    /// Waits for all workers to complete.
    ///
    /// Does not cancel; callers cancel first unless the source is finite.
    pub fn join(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        if let Some(handles) = self.handles.take() {
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("worker thread panicked");
                }
            }
        }
    }

    /// Returns the number of workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // an unjoined pool is abandoned: stop its workers before waiting
        if self.handles.is_some() {
            self.cancel.cancel(CancelReason::Interrupted);
            self.join_all();
        }
    }
}
