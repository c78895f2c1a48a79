//! This module contains the plain data types that flow through a sync run.
//!
//! A [`MessageRef`] is what the mail side hands us: one candidate newsletter. Once a candidate has
//! entered the pipeline it is represented by a [`TrackedDocument`] in the tracker, keyed by the
//! candidate's [identity](MessageRef::identity). The lifecycle of a tracked document is:
//!
//! ```text
//! unknown --> pending --> uploaded --> (removed from the tracker)
//! ```
//!
//! `pending` means an upload was attempted but never confirmed. A document observed as `pending`
//! when a run starts is retried as if it had never been seen. A document is only ever `uploaded`
//! with a remote document id attached, and it only leaves the tracker once the device has
//! confirmed the delete (or reports the document as already gone).

/// The stable deduplication key of a message; a lowercase hex SHA-256 digest.
pub type Identity = String;

/// Every tracked document, keyed by identity.
pub type Ledger = std::collections::BTreeMap<Identity, TrackedDocument>;

mod message;
pub use self::message::{Body, MessageRef};

mod document;
pub use self::document::{Status, TrackedDocument};

mod summary;
pub use self::summary::{AccountSummary, ItemFailure, RunSummary, Stage};
