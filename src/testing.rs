//! In-memory collaborators and fixture builders for unit tests.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::collaborators::{DeleteOutcome, Device, MailSource, PdfDocument, Renderer};
use crate::error::{DeviceError, MailError, RenderError};
use crate::types::{Body, MessageRef};

/// Midnight UTC, `n` days after 2026-09-01.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

/// A plain text newsletter without a Message-ID.
pub fn message(sender: &str, subject: &str, received_at: DateTime<Utc>) -> MessageRef {
    MessageRef {
        sender: sender.to_string(),
        sender_name: None,
        subject: subject.to_string(),
        received_at,
        body: Body::text(format!("{} from {}", subject, sender)),
        raw_message_identifier: None,
    }
}

/// A mailbox that returns a fixed set of messages, or fails.
pub struct FakeMail {
    pub account: String,
    pub messages: Vec<MessageRef>,
    pub fail: bool,
    /// Shared so tests can observe it after handing the source to an engine.
    pub fetches: Rc<Cell<usize>>,
}

impl FakeMail {
    pub fn new(account: &str, messages: Vec<MessageRef>) -> Self {
        FakeMail {
            account: account.to_string(),
            messages,
            fail: false,
            fetches: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing(account: &str) -> Self {
        FakeMail {
            fail: true,
            ..FakeMail::new(account, Vec::new())
        }
    }
}

impl MailSource for FakeMail {
    fn account(&self) -> &str {
        &self.account
    }

    fn fetch(&mut self, _lookback_days: u32) -> Result<Vec<MessageRef>, MailError> {
        self.fetches.set(self.fetches.get() + 1);
        if self.fail {
            return Err(MailError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(self.messages.clone())
    }
}

/// Produces a fake PDF per message; fails for the listed subjects.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_subjects: HashSet<String>,
}

impl Renderer for FakeRenderer {
    fn render(&self, message: &MessageRef) -> Result<Vec<u8>, RenderError> {
        if self.fail_subjects.contains(&message.subject) {
            return Err(RenderError::Empty);
        }
        Ok(format!("%PDF-1.7 {}", message.subject).into_bytes())
    }
}

/// A device that keeps documents in a map.
#[derive(Default)]
pub struct FakeDevice {
    /// remote id -> (folder, title)
    pub documents: BTreeMap<String, (String, String)>,
    /// Every successful upload, by title, in order.
    pub uploads: Vec<String>,
    /// Every delete call, by remote id, in order.
    pub deletes: Vec<String>,
    pub fail_upload_titles: HashSet<String>,
    pub fail_delete_ids: HashSet<String>,
    pub fail_listing: bool,
    pub unauthorized: bool,
    next_id: usize,
}

impl FakeDevice {
    /// Add a document as if it had been uploaded earlier.
    pub fn with_document(mut self, remote_id: &str, folder: &str, title: &str) -> Self {
        self.documents
            .insert(remote_id.to_string(), (folder.to_string(), title.to_string()));
        self
    }
}

impl Device for FakeDevice {
    fn upload(&mut self, document: &PdfDocument, folder: &str) -> Result<String, DeviceError> {
        if self.unauthorized {
            return Err(DeviceError::Unauthorized("token expired".into()));
        }
        if self.fail_upload_titles.contains(&document.title) {
            return Err(DeviceError::Status {
                endpoint: "upload".into(),
                status: 503,
                body: "try later".into(),
            });
        }
        self.next_id += 1;
        let id = format!("remote-{}", self.next_id);
        self.documents
            .insert(id.clone(), (folder.to_string(), document.title.clone()));
        self.uploads.push(document.title.clone());
        Ok(id)
    }

    fn delete(&mut self, remote_document_id: &str) -> Result<DeleteOutcome, DeviceError> {
        if self.unauthorized {
            return Err(DeviceError::Unauthorized("token expired".into()));
        }
        self.deletes.push(remote_document_id.to_string());
        if self.fail_delete_ids.contains(remote_document_id) {
            return Err(DeviceError::Status {
                endpoint: "delete".into(),
                status: 500,
                body: String::new(),
            });
        }
        Ok(match self.documents.remove(remote_document_id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    fn list_folder(&mut self, folder: &str) -> Result<Option<Vec<String>>, DeviceError> {
        if self.fail_listing {
            return Err(DeviceError::Malformed {
                endpoint: "docs".into(),
                reason: "truncated".into(),
            });
        }
        Ok(Some(
            self.documents
                .iter()
                .filter(|(_, (f, _))| f == folder)
                .map(|(id, _)| id.clone())
                .collect(),
        ))
    }
}
