//! Bulk keystore jobs: encrypt raw keys, decrypt keystores.
//!
//! Keys are processed on the rayon pool; results are written afterwards in
//! input order. A failing entry is logged and counted, never fatal.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::crypto::{decrypt_keystore, encrypt_to_keystore, CryptoError, Keypair, ScryptParams};
use crate::pipeline::Redactor;
use crate::run::{human_duration, CancelToken};

/// Errors that abort a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-batch counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    /// Entries skipped because the job was cancelled
    pub skipped: usize,
}

/// Where a keystore blob came from, for log messages.
#[derive(Debug, Clone)]
struct Entry {
    origin: String,
    text: String,
}

/// Encrypts every private key listed in `input` with one password.
///
/// Blank lines and `#` comments are ignored; keys may carry a `0x` prefix.
/// Writes `all.jsonl` and `files/<address>.json` under `out_dir`.
pub fn encrypt_privates(
    input: &Path,
    out_dir: &Path,
    password: &str,
    params: ScryptParams,
    redactor: &Redactor,
    cancel: &CancelToken,
) -> Result<BatchReport, BatchError> {
    let text = fs::read_to_string(input).map_err(|source| BatchError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let keys: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let files_dir = out_dir.join("files");
    fs::create_dir_all(&files_dir).map_err(|source| BatchError::Write {
        path: files_dir.clone(),
        source,
    })?;
    tracing::info!(inputs = %input.display(), out = %out_dir.display(), keys = keys.len(), "encrypt started");

    let start = Instant::now();
    let sealed: Vec<Option<Result<(Keypair, String), CryptoError>>> = keys
        .par_iter()
        .map(|(_, raw)| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(Keypair::from_hex(raw).and_then(|keypair| {
                let blob = encrypt_to_keystore(&keypair, password, params)?;
                Ok((keypair, blob))
            }))
        })
        .collect();

    let all_path = out_dir.join("all.jsonl");
    let mut all = open_output(&all_path, true)?;
    let mut report = BatchReport {
        total: keys.len(),
        ..Default::default()
    };

    for ((line_no, _), outcome) in keys.iter().zip(sealed) {
        let (keypair, blob) = match outcome {
            None => {
                report.skipped += 1;
                continue;
            }
            Some(Err(e)) => {
                report.failed += 1;
                tracing::error!(line = line_no, error = %redactor.mask(&e.to_string()), "keystore encrypt failed");
                continue;
            }
            Some(Ok(sealed)) => sealed,
        };
        let address = keypair.address().to_checksum();

        if let Err(e) = writeln!(all, "{}", blob) {
            report.failed += 1;
            tracing::error!(address = %address, error = %e, "append jsonl failed");
            continue;
        }
        let single = files_dir.join(format!("{}.json", keypair.address().to_hex()));
        if let Err(e) = fs::write(&single, &blob) {
            report.failed += 1;
            tracing::error!(address = %address, error = %e, "write single keystore failed");
            continue;
        }

        report.ok += 1;
        let private_key = keypair.private_key_hex();
        tracing::info!(
            address = %address,
            private_key = %redactor.field("private_key", &private_key),
            "ENCRYPTED"
        );
    }

    all.flush().map_err(|source| BatchError::Write {
        path: all_path,
        source,
    })?;
    log_finished("encrypt", &report, start);
    Ok(report)
}

/// Decrypts every keystore found under `input_dir` into `out_dir/all.txt`
/// as `address:0xprivate` lines.
///
/// Sources: `all.jsonl` (one keystore per line), top-level `*.json` and
/// `files/*.json`.
pub fn decrypt_keystores(
    input_dir: &Path,
    out_dir: &Path,
    password: &str,
    redactor: &Redactor,
    cancel: &CancelToken,
) -> Result<BatchReport, BatchError> {
    let files = collect_input_files(input_dir);
    if files.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no keystore files found");
        return Ok(BatchReport::default());
    }
    tracing::info!(inputs = %input_dir.display(), out = %out_dir.display(), files = files.len(), "decrypt started");

    let entries = read_entries(&files);
    let start = Instant::now();
    let opened: Vec<Option<Result<Keypair, CryptoError>>> = entries
        .par_iter()
        .map(|entry| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(decrypt_keystore(&entry.text, password))
            }
        })
        .collect();

    let out_path = out_dir.join("all.txt");
    let mut out = open_output(&out_path, false)?;
    let mut report = BatchReport {
        total: entries.len(),
        ..Default::default()
    };

    for (entry, outcome) in entries.iter().zip(opened) {
        let keypair = match outcome {
            None => {
                report.skipped += 1;
                continue;
            }
            Some(Err(e)) => {
                report.failed += 1;
                tracing::error!(file = %entry.origin, error = %e, "decrypt failed");
                continue;
            }
            Some(Ok(keypair)) => keypair,
        };
        let address = keypair.address().to_checksum();
        let private_key = keypair.private_key_hex();

        if let Err(e) = writeln!(out, "{}:{}", address, private_key) {
            report.failed += 1;
            tracing::error!(address = %address, error = %e, "write all.txt failed");
            continue;
        }
        report.ok += 1;
        tracing::info!(
            address = %address,
            private_key = %redactor.field("private_key", &private_key),
            "DECRYPTED"
        );
    }

    out.flush().map_err(|source| BatchError::Write {
        path: out_path,
        source,
    })?;
    log_finished("decrypt", &report, start);
    Ok(report)
}

/// Lists decrypt inputs: `all.jsonl` first, then `*.json`, then `files/*.json`.
pub fn collect_input_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let all = dir.join("all.jsonl");
    if all.is_file() {
        files.push(all);
    }
    files.extend(json_files(dir));
    files.extend(json_files(&dir.join("files")));
    files
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = read
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    found.sort();
    found
}

fn read_entries(files: &[PathBuf]) -> Vec<Entry> {
    let mut entries = Vec::new();
    for path in files {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "read keystore failed");
                continue;
            }
        };
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            for (n, line) in text.lines().enumerate() {
                if !line.trim().is_empty() {
                    entries.push(Entry {
                        origin: format!("{}:{}", path.display(), n + 1),
                        text: line.to_string(),
                    });
                }
            }
        } else {
            entries.push(Entry {
                origin: path.display().to_string(),
                text,
            });
        }
    }
    entries
}

fn open_output(path: &Path, append: bool) -> Result<BufWriter<File>, BatchError> {
    let file = if append {
        fs::OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    };
    file.map(BufWriter::new).map_err(|source| BatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn log_finished(job: &str, report: &BatchReport, start: Instant) {
    tracing::info!(
        total = report.total,
        ok = report.ok,
        failed = report.failed,
        skipped = report.skipped,
        elapsed = %human_duration(start.elapsed()),
        "{} finished",
        job
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::CancelReason;

    const PASSWORD: &str = "correct horse";

    fn keys(n: usize) -> Vec<Keypair> {
        (0..n).map(|_| Keypair::generate().unwrap()).collect()
    }

    fn write_privates(dir: &Path, keys: &[Keypair]) -> PathBuf {
        let mut text = String::from("# operator list\n\n");
        for (i, key) in keys.iter().enumerate() {
            let hex = key.private_key_hex();
            // alternate with and without 0x
            let line = if i % 2 == 0 { hex } else { hex[2..].to_string() };
            text.push_str(&line);
            text.push('\n');
        }
        text.push_str("not-a-key\n");
        let path = dir.join("privates.txt");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let work = tempfile::tempdir().unwrap();
        let originals = keys(3);
        let input = write_privates(work.path(), &originals);
        let enc_out = work.path().join("enc");
        fs::create_dir_all(&enc_out).unwrap();

        let redactor = Redactor::new(true);
        let report = encrypt_privates(
            &input,
            &enc_out,
            PASSWORD,
            ScryptParams::LIGHT,
            &redactor,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report, BatchReport { total: 4, ok: 3, failed: 1, skipped: 0 });

        let all = fs::read_to_string(enc_out.join("all.jsonl")).unwrap();
        assert_eq!(all.lines().count(), 3);
        for key in &originals {
            let single = enc_out.join("files").join(format!("{}.json", key.address().to_hex()));
            assert!(single.is_file());
        }

        // decrypt reads all.jsonl plus files/*.json
        let dec_out = work.path().join("dec");
        fs::create_dir_all(&dec_out).unwrap();
        let report = decrypt_keystores(&enc_out, &dec_out, PASSWORD, &redactor, &CancelToken::new()).unwrap();
        assert_eq!(report.total, 6);
        assert_eq!(report.ok, 6);

        let lines = fs::read_to_string(dec_out.join("all.txt")).unwrap();
        for key in &originals {
            let expected = format!("{}:{}", key.address().to_checksum(), key.private_key_hex());
            assert_eq!(lines.lines().filter(|l| *l == expected).count(), 2);
        }
    }

    #[test]
    fn test_decrypt_wrong_password_counts_failures() {
        let work = tempfile::tempdir().unwrap();
        let key = Keypair::generate().unwrap();
        let blob = encrypt_to_keystore(&key, PASSWORD, ScryptParams::LIGHT).unwrap();
        fs::write(work.path().join("one.json"), &blob).unwrap();
        fs::write(work.path().join("broken.json"), "{not json").unwrap();
        fs::write(work.path().join("notes.txt"), "ignored").unwrap();

        let out = tempfile::tempdir().unwrap();
        let report = decrypt_keystores(
            work.path(),
            out.path(),
            "wrong",
            &Redactor::new(false),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(fs::read_to_string(out.path().join("all.txt")).unwrap(), "");
    }

    #[test]
    fn test_cancelled_batch_skips_work() {
        let work = tempfile::tempdir().unwrap();
        let input = write_privates(work.path(), &keys(2));
        let cancel = CancelToken::new();
        cancel.cancel(CancelReason::Interrupted);

        let report = encrypt_privates(
            &input,
            work.path(),
            PASSWORD,
            ScryptParams::LIGHT,
            &Redactor::new(false),
            &cancel,
        )
        .unwrap();
        assert_eq!(report.skipped, 3);
        assert_eq!(report.ok, 0);
    }

    #[test]
    fn test_collect_input_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("files")).unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("all.jsonl"), "").unwrap();
        fs::write(dir.path().join("files/a.json"), "{}").unwrap();

        let files = collect_input_files(dir.path());
        assert_eq!(
            files,
            vec![
                dir.path().join("all.jsonl"),
                dir.path().join("b.json"),
                dir.path().join("files/a.json"),
            ]
        );
        assert!(collect_input_files(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_missing_input_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = encrypt_privates(
            &dir.path().join("nope.txt"),
            dir.path(),
            PASSWORD,
            ScryptParams::LIGHT,
            &Redactor::new(false),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::Read { .. }));
    }
}
