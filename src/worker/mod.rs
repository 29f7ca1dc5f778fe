//! Worker pool for parallel vanity address search.
//!
//! This module provides:
//! - Candidate sources (raw keys, seed phrases, fixed lists)
//! - Multi-threaded CPU workers
//! - Shared attempt counters

mod cpu;
mod pool;
mod source;

pub use cpu::{CpuWorker, WorkerStats};
pub use pool::{WorkerContext, WorkerPool};
pub use source::{
    Account, CandidateSource, Flow, Generated, ListSource, PrivateKeySource, SeedOrigin,
    SeedPhraseSource,
};
