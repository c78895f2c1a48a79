//! Deciding which fetched candidates are new.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::types::{Identity, Ledger, MessageRef, Status};

/// Per-account filters applied before deduplication.
#[derive(Debug, Clone)]
pub struct IngestFilters {
    /// When set, only these senders pass. An entry containing `@` matches one address exactly;
    /// any other entry (optionally written as `@example.com`) matches a domain and its
    /// subdomains. Matching is case-insensitive.
    pub allowed_senders: Option<Vec<String>>,
    /// Candidates sent longer ago than this are ignored.
    pub lookback: Duration,
}

impl IngestFilters {
    pub fn new(allowed_senders: Option<Vec<String>>, lookback_days: u32) -> Self {
        IngestFilters {
            allowed_senders,
            lookback: Duration::days(i64::from(lookback_days)),
        }
    }

    /// Whether `sender` passes the sender filter. Unfiltered passes everything.
    pub fn allows_sender(&self, sender: &str) -> bool {
        let allowed = match self.allowed_senders {
            Some(ref allowed) => allowed,
            None => return true,
        };
        let sender = sender.trim().to_lowercase();
        allowed.iter().any(|entry| {
            let entry = entry.trim().to_lowercase();
            match entry.strip_prefix('@') {
                Some(domain) => matches_domain(&sender, domain),
                None if entry.contains('@') => sender == entry,
                None => matches_domain(&sender, &entry),
            }
        })
    }
}

fn matches_domain(address: &str, domain: &str) -> bool {
    match address.rsplit_once('@') {
        Some((_, host)) => {
            host == domain
                || host
                    .strip_suffix(domain)
                    .map_or(false, |prefix| prefix.ends_with('.'))
        }
        None => false,
    }
}

/// A candidate that should be rendered and uploaded, with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestItem<'a> {
    pub identity: Identity,
    pub message: &'a MessageRef,
}

/// Select the candidates that must be converted and uploaded.
///
/// In order, a candidate is dropped when:
///
/// 1. it was sent before `now - filters.lookback`, or after `now` (clock skew);
/// 2. its sender does not pass [`IngestFilters::allows_sender`];
/// 3. its identity is already `known`, whether pending, uploaded or removed;
/// 4. an earlier candidate in the same batch has the same identity.
///
/// Survivors are returned in input order. The caller decides what `known` contains: records left
/// `pending` by a crashed run are excluded by the orchestrator so they get retried.
pub fn plan_ingest<'a>(
    candidates: &'a [MessageRef],
    known: &Ledger,
    filters: &IngestFilters,
    now: DateTime<Utc>,
) -> Vec<IngestItem<'a>> {
    let oldest = now - filters.lookback;
    let mut seen = HashSet::new();

    candidates
        .iter()
        .filter(|m| m.received_at >= oldest && m.received_at <= now)
        .filter(|m| filters.allows_sender(&m.sender))
        .filter_map(|message| {
            let identity = message.identity();
            let tracked = known.get(&identity).map_or(false, |doc| {
                matches!(doc.status, Status::Uploaded | Status::Pending | Status::Removed)
            });
            if tracked || !seen.insert(identity.clone()) {
                return None;
            }
            Some(IngestItem { identity, message })
        })
        .collect()
}
