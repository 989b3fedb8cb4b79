//! Per-request context

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::language::Language;
use crate::protocol::InboundMessage;
use crate::{Error, Result};

/// Layout of `request_time` stamps exchanged with clients and history
pub const REQUEST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the user sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Text,
    Document,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Document => "document",
        }
    }
}

impl std::str::FromStr for InteractionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "document" => Ok(Self::Document),
            other => Err(Error::Protocol(format!("unknown interaction type: {}", other))),
        }
    }
}

/// How a text request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    /// Conversational answer from dialogue history only
    #[default]
    Normal,
    /// Retrieval-grounded question answering
    Qa,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Qa => "qa",
        }
    }
}

/// Everything the pipeline needs to know about one inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identity of the connection the request arrived on
    pub connection_id: String,
    pub user_id: String,
    pub request_id: String,
    pub request_time: DateTime<Utc>,
    pub interaction: InteractionType,
    pub conversation: ConversationType,
    /// Optional retrieval backend selector
    pub rag_type: Option<String>,
    pub language: Language,
}

impl RequestContext {
    /// Build a context from a decoded inbound message
    pub fn from_inbound(connection_id: impl Into<String>, msg: &InboundMessage) -> Result<Self> {
        let request_time = parse_request_time(&msg.request_time)?;
        let rag_type = msg
            .rag_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            connection_id: connection_id.into(),
            user_id: msg.user_id.clone(),
            request_id: msg.request_id.clone(),
            request_time,
            interaction: msg.kind,
            conversation: msg.conv_type,
            rag_type,
            language: Language::detect(&msg.body),
        })
    }
}

/// Parse a request stamp; accepts `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339
pub fn parse_request_time(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    let head = trimmed.get(..19).unwrap_or(trimmed);
    if let Ok(naive) = NaiveDateTime::parse_from_str(head, REQUEST_TIME_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Protocol(format!("invalid request_time '{}': {}", raw, e)))
}

/// Render a timestamp in the `request_time` layout
pub fn format_request_time(time: &DateTime<Utc>) -> String {
    time.format(REQUEST_TIME_FORMAT).to_string()
}
