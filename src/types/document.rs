use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Identity;

/// Where a tracked document is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// An upload was attempted but has not been confirmed.
    Pending,
    /// The device holds the document under `remote_document_id`.
    Uploaded,
    /// The document was uploaded once and has since left the device, by expiry or by hand.
    ///
    /// The record stays until its message can no longer be fetched, so the message is not
    /// uploaded a second time.
    Removed,
}

/// One synchronized newsletter, as recorded in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDocument {
    /// Deduplication key of the source message.
    pub identity: Identity,
    /// Lifecycle state.
    pub status: Status,
    /// Identifier the device assigned to the upload.
    pub remote_document_id: Option<String>,
    /// When the upload was confirmed.
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Name of the mail account the message came from.
    pub source_account: String,
    /// Title the document carries on the device.
    #[serde(default)]
    pub title: String,
}

impl TrackedDocument {
    /// A record for a message we are about to upload.
    pub fn pending(
        identity: impl Into<Identity>,
        source_account: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        TrackedDocument {
            identity: identity.into(),
            status: Status::Pending,
            remote_document_id: None,
            uploaded_at: None,
            source_account: source_account.into(),
            title: title.into(),
        }
    }

    /// Confirm the upload. This is the only way a record becomes [`Status::Uploaded`], and it
    /// always attaches the remote id at the same time.
    pub fn into_uploaded(self, remote_document_id: String, uploaded_at: DateTime<Utc>) -> Self {
        TrackedDocument {
            status: Status::Uploaded,
            remote_document_id: Some(remote_document_id),
            uploaded_at: Some(uploaded_at),
            ..self
        }
    }

    /// The document is gone from the device. Keeps `uploaded_at` and drops the remote id.
    pub fn into_removed(self) -> Self {
        TrackedDocument {
            status: Status::Removed,
            remote_document_id: None,
            ..self
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == Status::Uploaded
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Describe why this record cannot be trusted, if it breaks a lifecycle invariant.
    pub(crate) fn inconsistency(&self) -> Option<&'static str> {
        match self.status {
            Status::Uploaded if self.remote_document_id.is_none() => {
                Some("uploaded without a remote document id")
            }
            Status::Uploaded if self.uploaded_at.is_none() => Some("uploaded without a timestamp"),
            Status::Removed if self.uploaded_at.is_none() => Some("removed without an upload time"),
            _ if self.identity.is_empty() => Some("empty identity"),
            _ => None,
        }
    }
}
