//! Tracing setup: an ANSI console layer plus a plain-text per-run log file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

/// A log file that can be attached after the subscriber is installed.
///
/// Writes are discarded until [`attach`](LogFile::attach) is called, so the
/// run directory can be created once settings are known.
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    slot: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path` in append mode and routes subsequent log lines to it.
    pub fn attach(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.lock() = Some(file);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer handed out per event by [`LogFile`].
pub struct LogFileWriter {
    slot: Arc<Mutex<Option<File>>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            slot: self.slot.clone(),
        }
    }
}

/// Builds the filter: `RUST_LOG` wins, otherwise `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber and returns the file slot for the run log.
pub fn init(level: &str) -> Result<LogFile, TryInitError> {
    let log_file = LogFile::new();

    let console = fmt::layer().with_target(false).with_thread_names(true);
    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(log_file.clone());

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console)
        .with(file)
        .try_init()?;

    Ok(log_file)
}
