//! Deciding which uploaded documents have aged out, and which removed records can be forgotten.

use chrono::{DateTime, Utc};

use crate::types::{Identity, Ledger, Status};

/// Select every uploaded document that is more than `max_age_days` old at `now`, oldest first.
///
/// Age is counted in whole calendar days (UTC) between the upload date and `now`, and the
/// comparison is strict: a document uploaded exactly `max_age_days` ago is kept for one more day.
/// Ties on upload time are broken by identity so the order is fully deterministic; callers that
/// can only process part of the plan should process a prefix.
pub fn plan_retention(known: &Ledger, max_age_days: u32, now: DateTime<Utc>) -> Vec<Identity> {
    let today = now.date_naive();
    let mut expired: Vec<_> = known
        .values()
        .filter(|doc| doc.is_uploaded())
        .filter_map(|doc| doc.uploaded_at.map(|at| (at, &doc.identity)))
        .filter(|(at, _)| (today - at.date_naive()).num_days() > i64::from(max_age_days))
        .collect();
    expired.sort();
    expired.into_iter().map(|(_, id)| id.clone()).collect()
}

/// Select removed records whose message can no longer come back through a fetch.
///
/// A message is uploaded after it arrives, so once the upload date is more than `lookback_days`
/// whole days ago the message is outside every future lookback window and its record can go.
/// Results are ordered by identity.
pub fn plan_purge(known: &Ledger, lookback_days: u32, now: DateTime<Utc>) -> Vec<Identity> {
    let today = now.date_naive();
    known
        .values()
        .filter(|doc| doc.status == Status::Removed)
        .filter(|doc| {
            doc.uploaded_at.map_or(true, |at| {
                (today - at.date_naive()).num_days() > i64::from(lookback_days)
            })
        })
        .map(|doc| doc.identity.clone())
        .collect()
}
