//! Append-only match records and the per-run output directory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use super::FoundEvent;
use crate::matcher::RuleKind;

/// Errors raised while persisting a match.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No keystore attached to match for {0}")]
    MissingKeystore(String),
}

/// Destination for found events, one logical record stream per rule kind.
pub trait RecordStore: Send {
    fn append(&mut self, event: &FoundEvent) -> Result<(), StoreError>;
}

/// How a match is written to its record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `{"address","private_key"}` per line in `<kind>.jsonl`
    RawJson,
    /// One keystore V3 document per line in `<kind>.jsonl`
    Keystore,
    /// `address=… index=… path=… mnemonic="…"` per line in `<kind>.log`
    SeedLine,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::RawJson | RecordFormat::Keystore => "jsonl",
            RecordFormat::SeedLine => "log",
        }
    }
}

#[derive(Serialize)]
struct RawRecord<'a> {
    address: &'a str,
    private_key: String,
}

/// Renders one record line (without the trailing newline).
pub fn render_record(format: RecordFormat, event: &FoundEvent) -> Result<String, StoreError> {
    let account = event.account();
    match format {
        RecordFormat::RawJson => Ok(serde_json::to_string(&RawRecord {
            address: &account.address,
            private_key: account.private_key_hex(),
        })?),
        RecordFormat::Keystore => event
            .keystore
            .clone()
            .ok_or_else(|| StoreError::MissingKeystore(account.address.clone())),
        RecordFormat::SeedLine => {
            let (index, path, mnemonic, passphrase) = match &account.seed {
                Some(seed) => (seed.index, seed.path.as_str(), &*seed.mnemonic, &*seed.passphrase),
                None => (0, "", "", ""),
            };
            Ok(format!(
                "address={} index={} path={} mnemonic={:?} passphrase={:?} priv={}",
                account.address,
                index,
                path,
                mnemonic,
                passphrase,
                account.private_key_hex()
            ))
        }
    }
}

/// Appends records to `<dir>/<kind>.<ext>`, keeping one handle per kind.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    format: RecordFormat,
    files: HashMap<RuleKind, File>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, format: RecordFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            files: HashMap::new(),
        }
    }

    /// Path of the record file for `kind`.
    pub fn path_for(&self, kind: RuleKind) -> PathBuf {
        self.dir
            .join(format!("{}.{}", kind.as_str(), self.format.extension()))
    }

    fn file(&mut self, kind: RuleKind) -> io::Result<&mut File> {
        if !self.files.contains_key(&kind) {
            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(kind))?;
            self.files.insert(kind, file);
        }
        self.files
            .get_mut(&kind)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "record file missing"))
    }
}

impl RecordStore for FileStore {
    fn append(&mut self, event: &FoundEvent) -> Result<(), StoreError> {
        let mut line = render_record(self.format, event)?;
        line.push('\n');
        // one write per record keeps lines whole
        self.file(event.result.kind)?.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Output directory of a single generate run.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Creates `<base>/<module>/<DD.MM.YYYY>/<module>_<HH-MM-SS>`, or
    /// `<module>_keystore_<HH-MM-SS>` when keys are stored encrypted.
    pub fn create(base: &Path, module: &str, keystore: bool) -> io::Result<Self> {
        Self::create_at(base, module, keystore, Local::now())
    }

    pub fn create_at(
        base: &Path,
        module: &str,
        keystore: bool,
        now: DateTime<Local>,
    ) -> io::Result<Self> {
        let leaf = if keystore {
            format!("{}_keystore_{}", module, now.format("%H-%M-%S"))
        } else {
            format!("{}_{}", module, now.format("%H-%M-%S"))
        };
        let path = base
            .join(module)
            .join(now.format("%d.%m.%Y").to_string())
            .join(leaf);
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join("app.log")
    }

    /// Saves the operator's password hint; empty hints are skipped.
    pub fn write_hint(&self, hint: Option<&str>) -> io::Result<()> {
        match hint.map(str::trim) {
            Some(hint) if !hint.is_empty() => fs::write(self.path.join("hint.txt"), format!("{}\n", hint)),
            _ => Ok(()),
        }
    }
}
