use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use newsletter_sync::config::{Config, LoggingConfig};
use newsletter_sync::remarkable::RemarkableClient;
use newsletter_sync::{Error, Result, RunSummary, SyncEngine};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Sync newsletter emails to a reMarkable tablet as PDFs, and expire old ones.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Read environment variables from this file instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Only fetch and upload; skip retention and reconciliation
    #[arg(long)]
    skip_cleanup: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load(&cli);
    let logging = match &config {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    let _guard = init_logging(&logging);

    let result = config.and_then(|config| run(&cli, &config));
    match result {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "sync failed");
            ExitCode::FAILURE
        }
    }
}

fn load(cli: &Cli) -> Result<Config> {
    load_env(cli.env_file.as_deref())?;
    let config = Config::load(&cli.config)?;
    config.validate()?;
    Ok(config)
}

/// Read environment variables from `env_file`, or from `.env` when there is one.
fn load_env(env_file: Option<&Path>) -> Result<()> {
    let (result, source) = match env_file {
        Some(path) => (dotenvy::from_path(path), path.display().to_string()),
        None => (dotenvy::dotenv().map(|_| ()), String::from(".env")),
    };
    match result {
        Ok(()) => Ok(()),
        // .env is optional
        Err(e) if env_file.is_none() && e.not_found() => Ok(()),
        Err(e) => Err(Error::Config(format!(
            "cannot load environment from {}: {}",
            source, e
        ))),
    }
}

fn run(cli: &Cli, config: &Config) -> Result<RunSummary> {
    info!(config = %cli.config.display(), skip_cleanup = cli.skip_cleanup, "starting sync");

    let accounts = config.mail_accounts()?;
    let device = RemarkableClient::new(config.remarkable_settings())
        .map_err(|e| Error::Config(format!("cannot set up the reMarkable client: {}", e)))?;
    device.register().map_err(|e| {
        if e.is_auth() {
            Error::DeviceAuth(e)
        } else {
            Error::Config(format!("reMarkable registration failed: {}", e))
        }
    })?;

    let mut engine = SyncEngine::new(
        accounts,
        config.renderer(),
        device,
        config.sync_settings(cli.skip_cleanup),
    );
    engine.run(Utc::now())
}

/// Log to stderr, and to `log_file` as well when one is configured.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.log_level));

    let (file_layer, guard) = match logging.log_file.as_deref().map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("cannot open log file: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn file_appender(path: &Path) -> std::result::Result<RollingFileAppender, String> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{} is not a file path", path.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn env_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.env");
        fs::write(&good, "NS_MAIN_TEST_VALUE=loaded\n").unwrap();
        load_env(Some(&good)).unwrap();
        assert_eq!(std::env::var("NS_MAIN_TEST_VALUE").unwrap(), "loaded");

        let missing = dir.path().join("missing.env");
        assert!(matches!(load_env(Some(&missing)), Err(Error::Config(_))));

        // the default .env may be absent, but not broken
        std::env::set_current_dir(dir.path()).unwrap();
        load_env(None).unwrap();
        fs::write(dir.path().join(".env"), "NS_MAIN_TEST_BROKEN=\"unterminated\n").unwrap();
        assert!(matches!(load_env(None), Err(Error::Config(_))));
    }
}
