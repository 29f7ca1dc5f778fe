//! Run control: cancellation, progress reporting and ordered shutdown.
//!
//! A run moves through `Running → Cancelling → Draining → Stopped`.
//! Interrupts, the first final match and an optional deadline all cancel
//! through the same [`CancelToken`].

mod cancel;
mod controller;
mod reporter;

pub use cancel::{CancelReason, CancelToken};
pub use controller::{
    RunController, RunError, RunOptions, RunState, RunStats, RunStatus, StopReason,
};
pub use reporter::{format_number, human_duration, Progress, ProgressReporter};
