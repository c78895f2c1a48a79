use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, PartType};

use crate::error::ParseError;
use crate::types::{Body, MessageRef};

const NO_SUBJECT: &str = "(no subject)";

/// Turn a raw RFC 5322 message into a candidate.
///
/// The send time comes from the `Date` header; `arrival` (the server's `INTERNALDATE`) is used
/// when the header is missing or unparseable. Without either the message cannot be deduplicated
/// reliably and is rejected.
pub fn parse_message(raw: &[u8], arrival: Option<DateTime<Utc>>) -> Result<MessageRef, ParseError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Unparseable)?;

    let from = message.from().and_then(|from| from.first());
    let sender = from
        .and_then(|addr| addr.address().or_else(|| addr.name()))
        .map(|addr| addr.trim().to_string())
        .unwrap_or_default();
    let sender_name = from
        .and_then(|addr| addr.name())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let subject = message
        .subject()
        .map(str::trim)
        .filter(|subject| !subject.is_empty())
        .unwrap_or(NO_SUBJECT)
        .to_string();

    let received_at = message
        .date()
        .and_then(|date| DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0))
        .or(arrival)
        .ok_or(ParseError::NoDate)?;

    let html = message.html_part(0).and_then(|part| match part.body {
        PartType::Html(ref html) => Some(html.to_string()),
        _ => None,
    });
    let text = message.text_part(0).and_then(|part| match part.body {
        PartType::Text(ref text) => Some(text.to_string()),
        _ => None,
    });

    let raw_message_identifier = message
        .message_id()
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|id| !id.is_empty());

    Ok(MessageRef {
        sender,
        sender_name,
        subject,
        received_at,
        body: Body { html, text },
        raw_message_identifier,
    })
}
