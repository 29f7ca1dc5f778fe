//! CPU-based worker for vanity address search.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{select, Sender};

use crate::matcher::RuleSet;
use crate::pipeline::{Candidate, FoundEvent, KeystoreSealer};
use crate::run::CancelToken;

use super::source::{Account, CandidateSource, Flow, Generated};

/// Counters shared by every worker of a run.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Addresses examined
    pub attempts: AtomicU64,
    /// Addresses that matched a rule
    pub matches: AtomicU64,
    /// Generation, derivation or sealing failures
    pub errors: AtomicU64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn total_matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// A worker that draws accounts from a source and tests them against the rules.
pub struct CpuWorker {
    /// Worker ID
    id: usize,
    rules: Arc<RuleSet>,
    source: Arc<dyn CandidateSource>,
    events: Sender<FoundEvent>,
    cancel: CancelToken,
    stats: Arc<WorkerStats>,
    /// Encrypts matches before they leave the worker
    sealer: Option<Arc<KeystoreSealer>>,
    /// Run start, for candidate timestamps
    start: Instant,
}

impl CpuWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        rules: Arc<RuleSet>,
        source: Arc<dyn CandidateSource>,
        events: Sender<FoundEvent>,
        cancel: CancelToken,
        stats: Arc<WorkerStats>,
        sealer: Option<Arc<KeystoreSealer>>,
        start: Instant,
    ) -> Self {
        Self {
            id,
            rules,
            source,
            events,
            cancel,
            stats,
            sealer,
            start,
        }
    }

    /// Runs the worker loop.
    ///
    /// Draws bursts from the source until:
    /// - Cancellation is observed at the loop head or during a send
    /// - The source is exhausted
    pub fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.source.generate(&mut |account| self.examine(account)) {
                Ok(Generated::Produced) => {}
                Ok(Generated::Exhausted) => break,
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(worker = self.id, error = %e, "candidate generation failed");
                }
            }
        }

        tracing::debug!(worker = self.id, "worker exiting");
    }

    /// Tests one account and forwards a match to the pipeline.
    fn examine(&self, account: Account) -> Flow {
        if self.cancel.is_cancelled() {
            return Flow::Stop;
        }

        let attempt = self.stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;

        let Some(result) = self.rules.evaluate(&account.address) else {
            return Flow::Continue;
        };
        self.stats.matches.fetch_add(1, Ordering::Relaxed);

        let mut event = FoundEvent::new(
            Candidate {
                account,
                attempt,
                elapsed: self.start.elapsed(),
            },
            result,
        );

        if let Some(sealer) = &self.sealer {
            match sealer.seal(event.account()) {
                Ok(blob) => event.keystore = Some(blob),
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        worker = self.id,
                        address = %event.account().address,
                        error = %e,
                        "keystore encryption failed, match dropped"
                    );
                    return if result.is_final { Flow::Stop } else { Flow::Continue };
                }
            }
        }

        let delivered = select! {
            send(self.events, event) -> sent => sent.is_ok(),
            recv(self.cancel.done()) -> _ => false,
        };

        if result.is_final || !delivered {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Returns the worker ID.
    pub fn id(&self) -> usize {
        self.id
    }
}
