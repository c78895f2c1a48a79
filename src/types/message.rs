use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::Identity;

/// The content of a message, as far as rendering cares about it.
///
/// Newsletters usually carry both an HTML and a plain text alternative; either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    /// The first `text/html` part of the message.
    pub html: Option<String>,
    /// The first `text/plain` part of the message.
    pub text: Option<String>,
}

impl Body {
    /// Body consisting of a single HTML part.
    pub fn html(html: impl Into<String>) -> Self {
        Body {
            html: Some(html.into()),
            text: None,
        }
    }

    /// Body consisting of a single plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Body {
            html: None,
            text: Some(text.into()),
        }
    }

    /// Whether neither alternative has any non-whitespace content.
    pub fn is_empty(&self) -> bool {
        let blank = |part: &Option<String>| part.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.html) && blank(&self.text)
    }
}

/// A candidate newsletter fetched from a mail account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// The sender's email address, as it appears in the `From` header.
    pub sender: String,
    /// The sender's display name, if the `From` header carried one.
    pub sender_name: Option<String>,
    /// The decoded `Subject` header.
    pub subject: String,
    /// When the message was sent (its `Date` header), or when the server received it.
    pub received_at: DateTime<Utc>,
    /// The renderable content.
    pub body: Body,
    /// The `Message-ID` header without angle brackets, if present.
    pub raw_message_identifier: Option<String>,
}

impl MessageRef {
    /// The deduplication key of this message.
    ///
    /// When the message carries a `Message-ID`, the identity is derived from it alone, so that the
    /// same message delivered to two accounts (or fetched twice) maps to one document. Otherwise
    /// it is derived from the sender, subject and send time, which is stable across fetches of the
    /// same message. The two derivations are domain separated and can never collide with each
    /// other.
    pub fn identity(&self) -> Identity {
        let mut hasher = Sha256::new();
        match self
            .raw_message_identifier
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => {
                hasher.update(b"message-id\0");
                hasher.update(id.as_bytes());
            }
            None => {
                hasher.update(b"content\0");
                hasher.update(self.sender.trim().to_lowercase().as_bytes());
                hasher.update(b"\0");
                hasher.update(self.subject.as_bytes());
                hasher.update(b"\0");
                hasher.update(self.received_at.timestamp().to_string().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    /// The name to show for the sender: the display name when known, else the address.
    pub fn sender_display(&self) -> &str {
        self.sender_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.sender)
    }
}
