//! Deciding which records to drop because their document vanished from the device.

use std::collections::HashSet;

use crate::types::{Identity, Ledger};

/// Select uploaded records whose remote document is not in `remote_ids`.
///
/// `remote_ids` must be a complete listing of the target folder; a failed or partial listing
/// must not be passed here. Pending records have nothing remote to compare and are never
/// selected. Results are ordered by identity.
pub fn plan_reconciliation<'a, I>(known: &Ledger, remote_ids: I) -> Vec<Identity>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: HashSet<&str> = remote_ids.into_iter().collect();
    known
        .values()
        .filter(|doc| doc.is_uploaded())
        .filter(|doc| {
            doc.remote_document_id
                .as_deref()
                .map_or(false, |remote| !present.contains(remote))
        })
        .map(|doc| doc.identity.clone())
        .collect()
}
