//! Runtime configuration: command line, app settings file, environment.
//!
//! Precedence, lowest first: built-in defaults, `configs/app.yaml`,
//! `VANITY__*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::crypto::mnemonic::{DEFAULT_DERIVE_COUNT, DEFAULT_STRENGTH};
use crate::crypto::ScryptParams;

/// EVM vanity wallet generator
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// App settings file (optional)
    #[arg(long, global = true, default_value = "configs/app.yaml")]
    pub app_config: PathBuf,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Hide private keys, mnemonics and passphrases in console output
    #[arg(long, global = true)]
    pub hide_secrets: bool,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Base directory for run outputs
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search for vanity addresses
    Generate(GenerateArgs),
    /// Encrypt raw private keys into keystore files
    Encrypt(EncryptArgs),
    /// Decrypt keystore files back to raw private keys
    Decrypt(DecryptArgs),
}

/// Where candidate accounts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Independent random private keys
    #[default]
    Private,
    /// Accounts derived from random seed phrases
    Mnemonic,
}

impl SourceKind {
    /// Module name used for run directories.
    pub fn module(self) -> &'static str {
        match self {
            SourceKind::Private => "private",
            SourceKind::Mnemonic => "mnemonics",
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" | "priv" | "keys" => Ok(SourceKind::Private),
            "mnemonic" | "mnemonics" | "seed" => Ok(SourceKind::Mnemonic),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.module())
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Candidate source: private or mnemonic
    #[arg(default_value = "private")]
    pub source: SourceKind,

    /// Rule configuration file
    #[arg(short, long, default_value = "configs/patterns.yaml")]
    pub patterns: PathBuf,

    /// Store matches as password-encrypted keystores (private source only)
    #[arg(long)]
    pub encrypt: bool,

    /// Keystore password
    #[arg(long, env = "VANITY_KEYSTORE_PASSWORD", hide_env_values = true)]
    pub keystore_password: Option<String>,

    /// Use cheap scrypt parameters for keystores
    #[arg(long)]
    pub light_kdf: bool,

    /// Password hint saved next to the results
    #[arg(long)]
    pub hint: Option<String>,

    /// Seed phrase length in words (12, 15, 18, 21 or 24)
    #[arg(long, default_value = "12")]
    pub words: usize,

    /// Accounts derived per seed phrase
    #[arg(short = 'n', long, default_value_t = DEFAULT_DERIVE_COUNT)]
    pub derive: u32,

    /// BIP-39 passphrase applied to every generated phrase
    #[arg(long, env = "VANITY_PASSPHRASE", hide_env_values = true, default_value = "")]
    pub passphrase: String,

    /// Progress report interval in seconds
    #[arg(short = 'r', long)]
    pub report_interval: Option<u64>,

    /// Stop the search after this many seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct EncryptArgs {
    /// File with one raw private key per line
    #[arg(short, long, default_value = "inputs/encrypt/privates.txt")]
    pub input: PathBuf,

    /// Keystore password
    #[arg(long, env = "VANITY_KEYSTORE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Use cheap scrypt parameters
    #[arg(long)]
    pub light_kdf: bool,

    /// Password hint saved next to the results
    #[arg(long)]
    pub hint: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DecryptArgs {
    /// Directory holding all.jsonl, *.json or files/*.json
    #[arg(short, long, default_value = "inputs/decrypt")]
    pub input: PathBuf,

    /// Keystore password
    #[arg(long, env = "VANITY_KEYSTORE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl GenerateArgs {
    /// Entropy strength in bits for the configured word count.
    pub fn strength_bits(&self) -> usize {
        self.words * 32 / 3
    }

    pub fn scrypt_params(&self) -> ScryptParams {
        if self.light_kdf {
            ScryptParams::LIGHT
        } else {
            ScryptParams::STANDARD
        }
    }

    /// Optional time limit for the search.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.filter(|&secs| secs > 0).map(Duration::from_secs)
    }

    /// Whether found keys are stored encrypted.
    pub fn keystore_usage(&self) -> bool {
        self.source == SourceKind::Private && self.encrypt
    }

    /// Validates the combination of flags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.words, 12 | 15 | 18 | 21 | 24) {
            return Err(ConfigError::InvalidSettings(format!(
                "words must be 12, 15, 18, 21 or 24, got {}",
                self.words
            )));
        }
        if self.derive == 0 {
            return Err(ConfigError::InvalidSettings(
                "derive count must be at least 1".into(),
            ));
        }
        if self.keystore_usage()
            && self.keystore_password.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::InvalidSettings(
                "--encrypt requires a non-empty keystore password".into(),
            ));
        }
        Ok(())
    }
}

impl Default for GenerateArgs {
    fn default() -> Self {
        Self {
            source: SourceKind::Private,
            patterns: PathBuf::from("configs/patterns.yaml"),
            encrypt: false,
            keystore_password: None,
            light_kdf: false,
            hint: None,
            words: DEFAULT_STRENGTH * 3 / 32,
            derive: DEFAULT_DERIVE_COUNT,
            passphrase: String::new(),
            report_interval: None,
            timeout: None,
        }
    }
}

/// Settings from the app config file and environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub log_level: String,
    pub hide_secrets_in_console: bool,
    /// Worker threads; 0 means one per CPU core
    pub cores: usize,
    pub report_interval_secs: u64,
    pub logs_dir: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            hide_secrets_in_console: false,
            cores: 0,
            report_interval_secs: 10,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl AppSettings {
    /// Loads settings from an optional YAML file, then `VANITY__*` variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("VANITY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, args: &GlobalArgs) {
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if args.hide_secrets {
            self.hide_secrets_in_console = true;
        }
        if let Some(workers) = args.workers {
            self.cores = workers;
        }
        if let Some(dir) = &args.logs_dir {
            self.logs_dir = dir.clone();
        }
    }

    /// Returns the number of workers, defaulting to CPU count
    pub fn worker_count(&self) -> usize {
        if self.cores == 0 {
            num_cpus::get()
        } else {
            self.cores
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("symbols must not be empty")]
    EmptySymbols,

    #[error("edges.minCount must be >= 0, got {0}")]
    NegativeMinCount(i64),

    #[error("edges.side must be one of: any, prefix, suffix (got {0:?})")]
    InvalidSide(String),

    #[error("symmetric[{index}].{field}: must be non-empty and contain only placeholders X or Y (got {template:?})")]
    InvalidTemplate {
        index: usize,
        field: &'static str,
        template: String,
    },

    #[error("no patterns defined: symmetric, specific, edges, regexp are all empty")]
    NoRules,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}
