//! EVM Vanity Address Generator CLI
//!
//! Usage:
//!   wallet-vanity generate                      # raw keys against configs/patterns.yaml
//!   wallet-vanity generate mnemonic -n 10       # 10 accounts per seed phrase
//!   wallet-vanity generate --encrypt -t 3600    # keystores, stop after an hour
//!   wallet-vanity encrypt -i inputs/encrypt/privates.txt
//!   wallet-vanity decrypt -i inputs/decrypt

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use wallet_vanity::batch;
use wallet_vanity::config::{Command, DecryptArgs, EncryptArgs, GenerateArgs, SourceKind};
use wallet_vanity::crypto::ScryptParams;
use wallet_vanity::logging::{self, LogFile};
use wallet_vanity::matcher::{Rule, RuleKind};
use wallet_vanity::pipeline::{KeystoreSealer, Redactor, TracingConsole};
use wallet_vanity::run::{format_number, human_duration};
use wallet_vanity::worker::CandidateSource;
use wallet_vanity::{
    AppSettings, CancelReason, CancelToken, Cli, FileStore, PrivateKeySource, RecordFormat,
    RuleSet, RunController, RunDir, RunOptions, SeedPhraseSource,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = AppSettings::load(&cli.global.app_config)?;
    settings.apply(&cli.global);

    let log_file = logging::init(&settings.log_level).context("failed to install logger")?;

    match cli.command {
        Command::Generate(args) => generate(&settings, &log_file, &args),
        Command::Encrypt(args) => encrypt(&settings, &log_file, &args),
        Command::Decrypt(args) => decrypt(&settings, &log_file, &args),
    }
}

fn generate(settings: &AppSettings, log_file: &LogFile, args: &GenerateArgs) -> Result<()> {
    args.validate()?;
    let rules = RuleSet::load(&args.patterns)?;

    let keystore = args.keystore_usage();
    let run_dir = open_run_dir(settings, args.source.module(), keystore, log_file)?;
    run_dir
        .write_hint(args.hint.as_deref())
        .context("failed to write password hint")?;

    let (source, format): (Arc<dyn CandidateSource>, RecordFormat) = match args.source {
        SourceKind::Private if keystore => (Arc::new(PrivateKeySource), RecordFormat::Keystore),
        SourceKind::Private => (Arc::new(PrivateKeySource), RecordFormat::RawJson),
        SourceKind::Mnemonic => (
            Arc::new(SeedPhraseSource::new(
                args.strength_bits(),
                args.derive,
                &args.passphrase,
            )),
            RecordFormat::SeedLine,
        ),
    };

    let mut options = RunOptions::new(settings.worker_count());
    options.report_interval = args
        .report_interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| settings.report_interval());
    options.deadline = args.deadline();
    if keystore {
        let password = args.keystore_password.clone().unwrap_or_default();
        options.sealer = Some(KeystoreSealer::new(password, args.scrypt_params()));
    }

    tracing::info!(
        module = args.source.module(),
        workers = options.workers,
        keystore,
        out = %run_dir.path().display(),
        symmetric = rules.count(RuleKind::Symmetric),
        specific = rules.count(RuleKind::Specific),
        edges = rules.count(RuleKind::Edges),
        regexp = rules.count(RuleKind::Regexp),
        has_final = rules.has_final(),
        "starting search"
    );
    if args.source == SourceKind::Mnemonic {
        tracing::info!(words = args.words, derive = args.derive, "seed phrase mode");
    }
    let alphabet = rules.alphabet_size();
    for rule in rules.rules() {
        if let Rule::Specific(specific) = rule {
            tracing::debug!(
                index = specific.index,
                difficulty = %format_number(specific.estimated_difficulty(alphabet)),
                "specific rule"
            );
        }
    }

    let controller = RunController::new(
        Arc::new(rules),
        source,
        Box::new(FileStore::new(run_dir.path(), format)),
        Arc::new(TracingConsole),
        Redactor::new(settings.hide_secrets_in_console),
        options,
    );
    install_interrupt(controller.cancel_token())?;

    let stats = controller.run()?;

    tracing::info!(
        attempts = %format_number(stats.attempts),
        matches = stats.matches,
        persisted = stats.persisted,
        failed_writes = stats.failed_writes,
        errors = stats.errors,
        elapsed = %human_duration(stats.elapsed),
        rate = %format!("{}/s", format_number(stats.rate() as u64)),
        reason = %stats.reason,
        "search finished"
    );
    Ok(())
}

fn encrypt(settings: &AppSettings, log_file: &LogFile, args: &EncryptArgs) -> Result<()> {
    if args.password.is_empty() {
        bail!("keystore password must not be empty");
    }
    let run_dir = open_run_dir(settings, "encrypt", false, log_file)?;
    run_dir
        .write_hint(args.hint.as_deref())
        .context("failed to write password hint")?;

    let cancel = CancelToken::new();
    install_interrupt(cancel.clone())?;

    let params = if args.light_kdf {
        ScryptParams::LIGHT
    } else {
        ScryptParams::STANDARD
    };
    batch::encrypt_privates(
        &args.input,
        run_dir.path(),
        &args.password,
        params,
        &Redactor::new(settings.hide_secrets_in_console),
        &cancel,
    )?;
    Ok(())
}

fn decrypt(settings: &AppSettings, log_file: &LogFile, args: &DecryptArgs) -> Result<()> {
    let run_dir = open_run_dir(settings, "decrypt", false, log_file)?;

    let cancel = CancelToken::new();
    install_interrupt(cancel.clone())?;

    batch::decrypt_keystores(
        &args.input,
        run_dir.path(),
        &args.password,
        &Redactor::new(settings.hide_secrets_in_console),
        &cancel,
    )?;
    Ok(())
}

fn open_run_dir(
    settings: &AppSettings,
    module: &str,
    keystore: bool,
    log_file: &LogFile,
) -> Result<RunDir> {
    let run_dir = RunDir::create(&settings.logs_dir, module, keystore)
        .with_context(|| format!("failed to create run directory under {}", settings.logs_dir.display()))?;
    log_file
        .attach(&run_dir.log_file())
        .context("failed to open app.log")?;
    Ok(run_dir)
}

fn install_interrupt(token: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if token.cancel(CancelReason::Interrupted) {
            tracing::warn!("interrupt received, shutting down");
        }
    })
    .context("failed to set Ctrl-C handler")
}
