//! Errors raised by the sync engine and by its collaborators.
//!
//! [`Error`] is reserved for conditions that end a run: bad configuration, a durable store that
//! cannot be read or written, or device credentials that no longer work. Everything that can go
//! wrong with a single message is reported through one of the collaborator errors
//! ([`MailError`], [`RenderError`], [`DeviceError`]) and is recorded in the run summary instead.

use std::io::Error as IoError;
use std::net::TcpStream;
use std::path::PathBuf;
use std::result;
use std::time::Duration;

use native_tls::HandshakeError as TlsHandshakeError;
use thiserror::Error;

/// A convenience wrapper around `Result` for [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// A fatal error that aborts the current run.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is missing, unreadable or contains invalid values.
    #[error("configuration error: {0}")]
    Config(String),
    /// The tracker file exists but is not valid JSON for a tracker.
    #[error("tracker state at {} is corrupt: {source}", path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The tracker file decodes but breaks an invariant of the tracked records.
    #[error("tracker state at {} is inconsistent: {reason}", path.display())]
    InvalidState { path: PathBuf, reason: String },
    /// The tracker file could not be read or written.
    #[error("tracker state at {} is not accessible: {source}", path.display())]
    StateIo {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// The device rejected our credentials; an operator has to re-register.
    #[error("device authentication failed: {0}")]
    DeviceAuth(#[source] DeviceError),
}

/// Failure to fetch candidates from a mail account.
#[derive(Debug, Error)]
pub enum MailError {
    /// An `io::Error` while talking to the server, including read/write timeouts.
    #[error("i/o error: {0}")]
    Io(#[from] IoError),
    /// No address of the server accepted a connection within the timeout.
    #[error("could not connect to {host}:{port} within {timeout:?}")]
    Connect {
        host: String,
        port: u16,
        timeout: Duration,
    },
    /// TLS setup failed.
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),
    /// The TLS handshake with the server failed.
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),
    /// The IMAP server answered with an error, or the login was refused.
    #[error("imap error: {0}")]
    Imap(#[from] imap::Error),
}

impl From<TlsHandshakeError<TcpStream>> for MailError {
    fn from(err: TlsHandshakeError<TcpStream>) -> MailError {
        MailError::TlsHandshake(err.to_string())
    }
}

/// A fetched message that cannot become a candidate; it is skipped, not retried.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not an RFC 5322 message.
    #[error("not a parseable message")]
    Unparseable,
    /// Neither a `Date` header nor a server-side arrival time is available.
    #[error("message has no usable date")]
    NoDate,
}

/// Failure to turn one message into a PDF.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Writing the intermediate document or reading the result failed.
    #[error("i/o error: {0}")]
    Io(#[from] IoError),
    /// The converter could not be started.
    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: IoError,
    },
    /// The converter exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    /// The converter did not finish within the per-call timeout and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    /// The converter succeeded but produced no output.
    #[error("converter produced an empty document")]
    Empty,
}

/// Failure of a call to the remote device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Transport-level failure, including timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The device service rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The service answered with an unexpected status.
    #[error("unexpected status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The service answered, but not with what we asked for.
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
    /// Reading or writing the persisted device token failed.
    #[error("token store error: {0}")]
    Token(String),
}

impl DeviceError {
    /// Whether this error means the credentials are no longer valid.
    ///
    /// Such errors are not retried per item: they abort the run.
    pub fn is_auth(&self) -> bool {
        matches!(self, DeviceError::Unauthorized(_))
    }
}
