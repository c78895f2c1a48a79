//! The IMAP implementation of [`MailSource`].
//!
//! Messages are fetched with `BODY.PEEK[]` so reading them never sets `\Seen` as a side effect;
//! flagging them is a separate, opt-in `STORE` that only touches mail from allowed senders.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use crate::collaborators::MailSource;
use crate::error::MailError;
use crate::parse::parse_message;
use crate::plan::IngestFilters;
use crate::types::MessageRef;

/// Where and how to reach one mailbox.
#[derive(Clone, Debug)]
pub struct ImapAccount {
    /// Label used in logs, summaries and the tracker.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    pub mark_as_read: bool,
    /// Only messages from these senders are marked read; absent means everyone.
    pub allowed_senders: Option<Vec<String>>,
    /// Bound on connecting and on every read or write once connected.
    pub timeout: Duration,
}

/// Fetches recent newsletters from an IMAP mailbox over TLS.
#[derive(Debug)]
pub struct ImapMailSource {
    account: ImapAccount,
}

impl ImapMailSource {
    pub fn new(account: ImapAccount) -> Self {
        ImapMailSource { account }
    }

    fn connect(&self) -> Result<imap::Session<TlsStream<TcpStream>>, MailError> {
        let account = &self.account;
        let tls = TlsConnector::builder().build()?;
        let client = connect_all_timeout(&account.host, account.port, &tls, account.timeout)?;
        client
            .login(&account.username, &account.password)
            .map_err(|e| MailError::Imap(e.0))
    }
}

impl MailSource for ImapMailSource {
    fn account(&self) -> &str {
        &self.account.name
    }

    fn fetch(&mut self, lookback_days: u32) -> Result<Vec<MessageRef>, MailError> {
        let since = (Utc::now() - chrono::Duration::days(i64::from(lookback_days))).date_naive();
        let mark_seen = self.account.mark_as_read.then(|| {
            IngestFilters::new(self.account.allowed_senders.clone(), lookback_days)
        });
        let mut session = self.connect()?;
        let result = fetch_since(&mut session, &self.account.folder, since, mark_seen.as_ref());
        if let Err(e) = session.logout() {
            debug!(account = %self.account.name, error = %e, "logout failed");
        }
        let messages = result?;
        info!(account = %self.account.name, count = messages.len(), "fetched messages");
        Ok(messages)
    }
}

fn connect_timeout(
    addr: &SocketAddr,
    domain: &str,
    tls: &TlsConnector,
    timeout: Duration,
) -> Result<imap::Client<TlsStream<TcpStream>>, MailError> {
    let tcp = TcpStream::connect_timeout(addr, timeout)?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;
    let stream = tls.connect(domain, tcp)?;
    let mut client = imap::Client::new(stream);
    client.read_greeting()?;
    Ok(client)
}

/// Resolve `host` and try every address in turn.
fn connect_all_timeout(
    host: &str,
    port: u16,
    tls: &TlsConnector,
    timeout: Duration,
) -> Result<imap::Client<TlsStream<TcpStream>>, MailError> {
    for addr in (host, port).to_socket_addrs()? {
        match connect_timeout(&addr, host, tls, timeout) {
            Ok(client) => return Ok(client),
            Err(e) => warn!(%addr, error = %e, "could not connect"),
        }
    }
    Err(MailError::Connect {
        host: host.to_string(),
        port,
        timeout,
    })
}

/// Select `folder` and return every parseable message that arrived on or after `since`.
///
/// With `mark_seen`, messages whose sender passes it are flagged `\Seen` afterwards. Works on any
/// authenticated session, so it can be driven by a scripted stream in tests.
pub(crate) fn fetch_since<T: Read + Write>(
    session: &mut imap::Session<T>,
    folder: &str,
    since: NaiveDate,
    mark_seen: Option<&IngestFilters>,
) -> Result<Vec<MessageRef>, MailError> {
    session.select(folder)?;

    let query = format!("SINCE {}", since.format("%d-%b-%Y"));
    let mut seqs: Vec<u32> = session.search(&query)?.into_iter().collect();
    if seqs.is_empty() {
        return Ok(Vec::new());
    }
    seqs.sort_unstable();

    let fetches = session.fetch(sequence_set(&seqs), "(INTERNALDATE BODY.PEEK[])")?;
    let mut messages = Vec::new();
    let mut seen = Vec::new();
    for fetch in fetches.iter() {
        let Some(raw) = fetch.body() else {
            warn!(seq = fetch.message, "server returned no body");
            continue;
        };
        let arrival = fetch.internal_date().map(|at| at.with_timezone(&Utc));
        match parse_message(raw, arrival) {
            Ok(message) => {
                if mark_seen.map_or(false, |filters| filters.allows_sender(&message.sender)) {
                    seen.push(fetch.message);
                }
                messages.push(message);
            }
            Err(e) => warn!(seq = fetch.message, error = %e, "skipping message"),
        }
    }

    if !seen.is_empty() {
        session.store(sequence_set(&seen), "+FLAGS (\\Seen)")?;
    }
    Ok(messages)
}

fn sequence_set(seqs: &[u32]) -> String {
    seqs.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
