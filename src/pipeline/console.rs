//! Operator-facing echo of matches and progress, with secret redaction.

use std::borrow::Cow;
use std::time::Duration;

use regex::Regex;

use super::FoundEvent;
use crate::matcher::RuleKind;
use crate::run::{format_number, human_duration, Progress};

/// Replacement for hidden values.
pub const REDACTED: &str = "[REDACTED]";

/// Field names whose values never reach the console when secrets are hidden.
const SENSITIVE_KEYS: &[&str] = &[
    "private",
    "private_key",
    "privatekey",
    "priv",
    "secret",
    "mnemonic",
    "seed",
    "passphrase",
    "keystore",
    "raw_key",
    "key",
];

/// Raw private keys (64 hex digits, optional `0x`).
const KEY_PATTERN: &str = r"(?i)\b(0x)?[0-9a-f]{64}\b";

/// Console view of a match; secret fields are already redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEcho {
    pub kind: RuleKind,
    pub address: String,
    pub attempt: u64,
    pub elapsed: Duration,
    pub is_final: bool,
    pub private_key: String,
    pub seed: Option<SeedEcho>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEcho {
    pub mnemonic: String,
    pub passphrase: String,
    pub path: String,
}

/// Sink for operator-facing output, handed to the sink and reporter at
/// construction.
pub trait Console: Send + Sync {
    fn found(&self, echo: &FoundEcho);
    fn progress(&self, progress: &Progress);
    fn notice(&self, message: &str);
}

/// Forwards console output to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn found(&self, echo: &FoundEcho) {
        let elapsed = human_duration(echo.elapsed);
        match &echo.seed {
            Some(seed) => tracing::info!(
                kind = %echo.kind,
                address = %echo.address,
                attempt = echo.attempt,
                elapsed = %elapsed,
                path = %seed.path,
                mnemonic = %seed.mnemonic,
                passphrase = %seed.passphrase,
                private_key = %echo.private_key,
                "FOUND"
            ),
            None => tracing::info!(
                kind = %echo.kind,
                address = %echo.address,
                attempt = echo.attempt,
                elapsed = %elapsed,
                private_key = %echo.private_key,
                "FOUND"
            ),
        }
    }

    fn progress(&self, progress: &Progress) {
        tracing::info!(
            attempts = %format_number(progress.attempts),
            matches = progress.matches,
            elapsed = %human_duration(progress.elapsed),
            rate = %format!("{}/s", format_number(progress.rate as u64)),
            "status"
        );
    }

    fn notice(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Strips secrets from console output when hiding is enabled.
#[derive(Debug, Clone)]
pub struct Redactor {
    hide_secrets: bool,
    key_pattern: Option<Regex>,
}

impl Redactor {
    pub fn new(hide_secrets: bool) -> Self {
        Self {
            hide_secrets,
            key_pattern: Regex::new(KEY_PATTERN).ok(),
        }
    }

    /// Whether values under `key` are treated as secret.
    pub fn is_sensitive(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_KEYS.contains(&key.as_str())
    }

    /// Returns `value`, or the redaction marker for a hidden secret field.
    pub fn field<'a>(&self, key: &str, value: &'a str) -> Cow<'a, str> {
        if self.hide_secrets && Self::is_sensitive(key) {
            Cow::Borrowed(REDACTED)
        } else {
            Cow::Borrowed(value)
        }
    }

    /// Masks raw private keys appearing in free text.
    pub fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match (&self.key_pattern, self.hide_secrets) {
            (Some(pattern), true) => pattern.replace_all(text, REDACTED),
            _ => Cow::Borrowed(text),
        }
    }

    /// Builds the console view of a match.
    pub fn echo(&self, event: &FoundEvent) -> FoundEcho {
        let account = event.account();
        let private_key = account.private_key_hex();
        FoundEcho {
            kind: event.result.kind,
            address: account.address.clone(),
            attempt: event.candidate.attempt,
            elapsed: event.candidate.elapsed,
            is_final: event.result.is_final,
            private_key: self.field("private_key", &private_key).into_owned(),
            seed: account.seed.as_ref().map(|seed| SeedEcho {
                mnemonic: self.field("mnemonic", &seed.mnemonic).into_owned(),
                passphrase: self.field("passphrase", &seed.passphrase).into_owned(),
                path: seed.path.clone(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures console output for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingConsole {
        pub found: Mutex<Vec<FoundEcho>>,
        pub progress: Mutex<Vec<Progress>>,
        pub notices: Mutex<Vec<String>>,
    }

    impl Console for RecordingConsole {
        fn found(&self, echo: &FoundEcho) {
            self.found.lock().unwrap().push(echo.clone());
        }

        fn progress(&self, progress: &Progress) {
            self.progress.lock().unwrap().push(*progress);
        }

        fn notice(&self, message: &str) {
            self.notices.lock().unwrap().push(message.to_string());
        }
    }
}
