//! The capabilities the sync engine consumes but does not implement.
//!
//! Each capability is a small trait with one implementation per provider: [`crate::mail`] for
//! mail accounts (Gmail and iCloud are the same IMAP implementation with different connection
//! parameters), [`crate::render`] for PDF conversion and [`crate::remarkable`] for the device.
//! Tests substitute in-memory implementations.

use crate::error::{DeviceError, MailError, RenderError};
use crate::types::MessageRef;

/// A source of candidate messages for one configured mail account.
pub trait MailSource {
    /// The account name used in the tracker and in summaries.
    fn account(&self) -> &str;

    /// Fetch the messages sent within the last `lookback_days`.
    ///
    /// An error means the account could not be read at all; the orchestrator treats it as "no
    /// candidates for this account" and moves on.
    fn fetch(&mut self, lookback_days: u32) -> Result<Vec<MessageRef>, MailError>;
}

/// Converts a message into a PDF.
pub trait Renderer {
    fn render(&self, message: &MessageRef) -> Result<Vec<u8>, RenderError>;
}

/// A rendered newsletter ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    /// The visible name on the device.
    pub title: String,
    pub bytes: Vec<u8>,
}

/// Result of a delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The document was already gone; treated the same as a successful delete.
    NotFound,
}

/// The remote tablet.
pub trait Device {
    /// Upload `document` into the folder named `folder`, creating it if needed, and return the
    /// identifier the device assigned.
    fn upload(&mut self, document: &PdfDocument, folder: &str) -> Result<String, DeviceError>;

    /// Delete the document with the given remote id.
    fn delete(&mut self, remote_document_id: &str) -> Result<DeleteOutcome, DeviceError>;

    /// The ids of every document currently in the folder named `folder`, or `None` if there is
    /// no such folder.
    fn list_folder(&mut self, folder: &str) -> Result<Option<Vec<String>>, DeviceError>;
}

impl<T: MailSource + ?Sized> MailSource for Box<T> {
    fn account(&self) -> &str {
        (**self).account()
    }

    fn fetch(&mut self, lookback_days: u32) -> Result<Vec<MessageRef>, MailError> {
        (**self).fetch(lookback_days)
    }
}

impl<T: Renderer + ?Sized> Renderer for Box<T> {
    fn render(&self, message: &MessageRef) -> Result<Vec<u8>, RenderError> {
        (**self).render(message)
    }
}

impl<T: Device + ?Sized> Device for Box<T> {
    fn upload(&mut self, document: &PdfDocument, folder: &str) -> Result<String, DeviceError> {
        (**self).upload(document, folder)
    }

    fn delete(&mut self, remote_document_id: &str) -> Result<DeleteOutcome, DeviceError> {
        (**self).delete(remote_document_id)
    }

    fn list_folder(&mut self, folder: &str) -> Result<Option<Vec<String>>, DeviceError> {
        (**self).list_folder(folder)
    }
}
