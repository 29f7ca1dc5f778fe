//! # wallet_vanity
//!
//! Multi-threaded EVM vanity address search.
//!
//! ## Architecture
//!
//! - `crypto`: Key generation, seed-phrase derivation, keystores
//! - `matcher`: Rule set loading and evaluation
//! - `worker`: Candidate sources and the worker pool
//! - `pipeline`: Match events, persistence and console echo
//! - `run`: Cancellation, progress reporting and ordered shutdown
//! - `batch`: Bulk keystore encrypt/decrypt
//! - `config`: Runtime configuration
//! - `logging`: Tracing subscriber setup

pub mod batch;
pub mod config;
pub mod crypto;
pub mod logging;
pub mod matcher;
pub mod pipeline;
pub mod run;
pub mod worker;

pub use config::{AppSettings, Cli, ConfigError};
pub use crypto::{Address, CryptoError, Keypair};
pub use matcher::{MatchResult, RuleKind, RuleSet};
pub use pipeline::{FileStore, FoundEvent, RecordFormat, RunDir};
pub use run::{CancelReason, CancelToken, RunController, RunOptions, RunStats, StopReason};
pub use worker::{CandidateSource, PrivateKeySource, SeedPhraseSource, WorkerPool};
