//! Periodic throughput summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};

use super::CancelToken;
use crate::pipeline::Console;
use crate::worker::WorkerStats;

/// A snapshot of run throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub attempts: u64,
    pub matches: u64,
    pub elapsed: Duration,
    /// Attempts per second since the run started
    pub rate: f64,
}

impl Progress {
    pub fn measure(stats: &WorkerStats, elapsed: Duration) -> Self {
        let attempts = stats.total_attempts();
        let secs = elapsed.as_secs_f64();
        Self {
            attempts,
            matches: stats.total_matches(),
            elapsed,
            rate: if secs > 0.0 { attempts as f64 / secs } else { 0.0 },
        }
    }
}

/// Emits a [`Progress`] line on a fixed interval until cancelled or stopped.
pub struct ProgressReporter {
    stats: Arc<WorkerStats>,
    console: Arc<dyn Console>,
    cancel: CancelToken,
    interval: Duration,
    start: Instant,
}

impl ProgressReporter {
    pub fn new(
        stats: Arc<WorkerStats>,
        console: Arc<dyn Console>,
        cancel: CancelToken,
        interval: Duration,
        start: Instant,
    ) -> Self {
        Self {
            stats,
            console,
            cancel,
            interval,
            start,
        }
    }

    /// Runs until the cancel token fires or `stop` disconnects.
    ///
    /// Returns the number of reports emitted.
    pub fn run(self, stop: Receiver<()>) -> u64 {
        let ticker = tick(self.interval);
        let mut reports = 0;

        loop {
            select! {
                recv(self.cancel.done()) -> _ => break,
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    let progress = Progress::measure(&self.stats, self.start.elapsed());
                    self.console.progress(&progress);
                    reports += 1;
                }
            }
        }

        reports
    }
}

/// Formats a duration as `42s`, `3m05s` or `1h02m03s`.
pub fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Formats a count with K/M/B suffixes.
pub fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
