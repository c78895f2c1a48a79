use std::fmt;

use super::Identity;

/// The step of a run at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The whole account could not be fetched.
    Fetch,
    Render,
    Upload,
    Delete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Render => "render",
            Stage::Upload => "upload",
            Stage::Delete => "delete",
        })
    }
}

/// A non-fatal failure recorded during a run. The item is retried on the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// The affected document; `None` for account-level fetch failures.
    pub identity: Option<Identity>,
    pub account: Option<String>,
    pub stage: Stage,
    pub reason: String,
}

/// Ingest counts for one mail account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSummary {
    pub account: String,
    /// Candidates returned by the mail source.
    pub fetched: usize,
    /// Candidates that survived planning and were attempted.
    pub ingested: usize,
    pub uploaded: usize,
    /// Attempted candidates that failed to render or upload.
    pub failed: usize,
    /// Set when the account could not be fetched at all.
    pub fetch_error: Option<String>,
}

impl AccountSummary {
    pub fn new(account: impl Into<String>) -> Self {
        AccountSummary {
            account: account.into(),
            ..AccountSummary::default()
        }
    }
}

/// What one run did, per account and in aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub accounts: Vec<AccountSummary>,
    /// Documents deleted from the device (or found already gone) and marked removed.
    pub deleted: usize,
    /// Retention deletes that failed and will be retried.
    pub delete_failed: usize,
    /// Records marked removed because the document disappeared from the device.
    pub reconciled: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunSummary {
    pub fn fetched(&self) -> usize {
        self.accounts.iter().map(|a| a.fetched).sum()
    }

    pub fn ingested(&self) -> usize {
        self.accounts.iter().map(|a| a.ingested).sum()
    }

    pub fn uploaded(&self) -> usize {
        self.accounts.iter().map(|a| a.uploaded).sum()
    }

    /// Failed ingest items plus failed deletes.
    pub fn failed(&self) -> usize {
        self.accounts.iter().map(|a| a.failed).sum::<usize>() + self.delete_failed
    }

    pub(crate) fn record_failure(
        &mut self,
        identity: Option<&str>,
        account: Option<&str>,
        stage: Stage,
        reason: impl ToString,
    ) {
        self.failures.push(ItemFailure {
            identity: identity.map(str::to_string),
            account: account.map(str::to_string),
            stage,
            reason: reason.to_string(),
        });
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for account in &self.accounts {
            write!(
                f,
                "{}: fetched {}, ingested {}, uploaded {}, failed {}",
                account.account, account.fetched, account.ingested, account.uploaded, account.failed
            )?;
            if let Some(ref err) = account.fetch_error {
                write!(f, " (fetch failed: {})", err)?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "total: fetched {}, ingested {}, uploaded {}, failed {}, deleted {}, reconciled {}",
            self.fetched(),
            self.ingested(),
            self.uploaded(),
            self.failed(),
            self.deleted,
            self.reconciled
        )?;
        for failure in &self.failures {
            write!(f, "  {} failed", failure.stage)?;
            if let Some(ref account) = failure.account {
                write!(f, " [{}]", account)?;
            }
            if let Some(ref identity) = failure.identity {
                write!(f, " {}", identity)?;
            }
            writeln!(f, ": {}", failure.reason)?;
        }
        Ok(())
    }
}
