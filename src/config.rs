//! Configuration loading and validation.
//!
//! The configuration is a TOML file with these sections, all optional except the mail accounts:
//!
//! - **sync**: lookback window, tracker location, per-call timeout
//! - **cleanup**: retention age, deletion cap, reconciliation
//! - **remarkable**: target folder and device credentials
//! - **render**: the HTML to PDF command
//! - **email_accounts**: one entry per mailbox
//! - **logging**: level and optional log file
//!
//! Secrets never live in the file. Accounts and the device name the environment variables that
//! hold them, and [`Config::validate`] checks those are set before anything is contacted.
//!
//! ```toml
//! [sync]
//! lookback_days = 7
//!
//! [[email_accounts]]
//! email = "me@gmail.com"
//! provider = "gmail"
//! password_env = "GMAIL_APP_PASSWORD"
//! allowed_senders = ["newsletter@substack.com", "economist.com"]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mail::{ImapAccount, ImapMailSource};
use crate::remarkable::{Endpoints, RemarkableSettings};
use crate::render::CommandRenderer;
use crate::sync::{MailAccount, SyncSettings};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub remarkable: RemarkableConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub email_accounts: Vec<EmailAccountConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Only messages received within this many days are considered.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Set `\Seen` on fetched messages from allowed senders.
    #[serde(default)]
    pub mark_as_read: bool,
    #[serde(default = "default_tracker_file")]
    pub tracker_file: PathBuf,
    /// Bound on every network call and on each PDF conversion.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Uploaded documents older than this many whole days are deleted from the device.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default)]
    pub max_deletions_per_run: Option<usize>,
    /// Mark documents removed when they were deleted on the tablet by hand.
    #[serde(default = "default_true")]
    pub reconcile: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemarkableConfig {
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
    /// Environment variable holding the one-time code from my.remarkable.com.
    ///
    /// Only needed until the device token has been stored.
    #[serde(default = "default_one_time_code_env")]
    pub one_time_code_env: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Command line of the converter; `{input}` and `{output}` are substituted.
    #[serde(default = "default_render_command")]
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write logs to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Mail providers with well-known IMAP endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Icloud,
    /// Any other server; `imap_server` is required.
    #[default]
    Imap,
}

impl Provider {
    fn preset(self) -> Option<(&'static str, u16)> {
        match self {
            Provider::Gmail => Some(("imap.gmail.com", 993)),
            Provider::Icloud => Some(("imap.mail.me.com", 993)),
            Provider::Imap => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAccountConfig {
    /// The address; also the account name in the tracker and in summaries.
    pub email: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub imap_server: Option<String>,
    #[serde(default)]
    pub imap_port: Option<u16>,
    /// Login name, when it differs from `email`.
    #[serde(default)]
    pub username: Option<String>,
    /// Environment variable holding the (app) password.
    pub password_env: String,
    #[serde(default = "default_mail_folder")]
    pub folder: String,
    /// Addresses or domains to accept; absent means everyone.
    #[serde(default)]
    pub allowed_senders: Option<Vec<String>>,
}

impl EmailAccountConfig {
    /// Host and port to connect to, after applying the provider preset.
    pub fn endpoint(&self) -> Result<(String, u16)> {
        let preset = self.provider.preset();
        let host = self
            .imap_server
            .clone()
            .filter(|host| !host.trim().is_empty())
            .or_else(|| preset.map(|(host, _)| host.to_string()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "account {}: imap_server is required for provider \"imap\"",
                    self.email
                ))
            })?;
        let port = self
            .imap_port
            .or_else(|| preset.map(|(_, port)| port))
            .unwrap_or(993);
        Ok((host, port))
    }

    fn password(&self) -> Result<String> {
        env::var(&self.password_env)
            .ok()
            .filter(|password| !password.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "account {}: environment variable {} is not set",
                    self.email, self.password_env
                ))
            })
    }
}

fn default_lookback_days() -> u32 {
    7
}

fn default_tracker_file() -> PathBuf {
    PathBuf::from("tracker.json")
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_max_age_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_folder_name() -> String {
    String::from("Newsletters")
}

fn default_one_time_code_env() -> String {
    String::from("REMARKABLE_ONE_TIME_CODE")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("remarkable-token.json")
}

fn default_render_command() -> String {
    String::from("weasyprint {input} {output}")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_mail_folder() -> String {
    String::from("INBOX")
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            lookback_days: default_lookback_days(),
            mark_as_read: false,
            tracker_file: default_tracker_file(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        CleanupConfig {
            max_age_days: default_max_age_days(),
            max_deletions_per_run: None,
            reconcile: true,
        }
    }
}

impl Default for RemarkableConfig {
    fn default() -> Self {
        RemarkableConfig {
            folder_name: default_folder_name(),
            one_time_code_env: default_one_time_code_env(),
            token_file: default_token_file(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            command: default_render_command(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Config {
    /// Read and parse the configuration file. Does not validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&contents).map_err(|e| match e {
            Error::Config(reason) => Error::Config(format!("{}: {}", path.display(), reason)),
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.email_accounts.is_empty() {
            return Err(Error::Config(String::from("no email_accounts configured")));
        }
        if self.cleanup.max_age_days == 0 {
            return Err(Error::Config(String::from(
                "cleanup.max_age_days must be at least 1",
            )));
        }
        if self.sync.lookback_days == 0 {
            return Err(Error::Config(String::from(
                "sync.lookback_days must be at least 1",
            )));
        }
        if self.sync.call_timeout_secs == 0 {
            return Err(Error::Config(String::from(
                "sync.call_timeout_secs must be at least 1",
            )));
        }
        if self.remarkable.folder_name.trim().is_empty() {
            return Err(Error::Config(String::from(
                "remarkable.folder_name must not be empty",
            )));
        }
        if self.render.command.trim().is_empty() {
            return Err(Error::Config(String::from(
                "render.command must not be empty",
            )));
        }
        for account in &self.email_accounts {
            if account.email.trim().is_empty() {
                return Err(Error::Config(String::from(
                    "email_accounts entry without an email",
                )));
            }
            account.endpoint()?;
            account.password()?;
            if let Some(senders) = &account.allowed_senders {
                if senders.iter().any(|sender| sender.trim().is_empty()) {
                    return Err(Error::Config(format!(
                        "account {}: allowed_senders contains an empty entry",
                        account.email
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.call_timeout_secs)
    }

    pub fn sync_settings(&self, skip_cleanup: bool) -> SyncSettings {
        SyncSettings {
            tracker_path: self.sync.tracker_file.clone(),
            lookback_days: self.sync.lookback_days,
            max_age_days: self.cleanup.max_age_days,
            folder_name: self.remarkable.folder_name.clone(),
            max_deletions_per_run: self.cleanup.max_deletions_per_run,
            reconcile: self.cleanup.reconcile,
            skip_cleanup,
        }
    }

    /// One IMAP source per configured account, with its password taken from the environment.
    pub fn mail_accounts(&self) -> Result<Vec<MailAccount>> {
        self.email_accounts
            .iter()
            .map(|account| {
                let (host, port) = account.endpoint()?;
                let source = ImapMailSource::new(ImapAccount {
                    name: account.email.clone(),
                    host,
                    port,
                    username: account
                        .username
                        .clone()
                        .unwrap_or_else(|| account.email.clone()),
                    password: account.password()?,
                    folder: account.folder.clone(),
                    mark_as_read: self.sync.mark_as_read,
                    allowed_senders: account.allowed_senders.clone(),
                    timeout: self.call_timeout(),
                });
                Ok(MailAccount::new(
                    Box::new(source),
                    account.allowed_senders.clone(),
                ))
            })
            .collect()
    }

    pub fn renderer(&self) -> CommandRenderer {
        CommandRenderer::new(&self.render.command, self.call_timeout())
    }

    pub fn remarkable_settings(&self) -> RemarkableSettings {
        RemarkableSettings {
            token_file: self.remarkable.token_file.clone(),
            one_time_code: env::var(&self.remarkable.one_time_code_env)
                .ok()
                .filter(|code| !code.trim().is_empty()),
            timeout: self.call_timeout(),
            endpoints: Endpoints::default(),
        }
    }
}
