//! Event pipeline from workers to a single consumer.
//!
//! Workers push [`FoundEvent`]s into one bounded queue (capacity
//! proportional to the worker count). A full queue blocks the sending
//! worker until the sink catches up or the run is cancelled. The
//! [`EventSink`] persists every event it receives, echoes it through a
//! [`Console`] and triggers the fire-once final cancellation.

mod console;
mod event;
mod sink;
mod store;

pub use console::{Console, FoundEcho, Redactor, SeedEcho, TracingConsole, REDACTED};
pub use event::{Candidate, FoundEvent, KeystoreSealer};
pub use sink::{EventSink, SinkReport};
pub use store::{render_record, FileStore, RecordFormat, RecordStore, RunDir, StoreError};

#[cfg(test)]
pub(crate) use console::testing::RecordingConsole;
