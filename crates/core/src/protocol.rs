//! Wire protocol
//!
//! Clients send one JSON object per user action and receive a stream of
//! status messages correlated by `request_id`.

use serde::{Deserialize, Serialize};

use crate::request::{ConversationType, InteractionType};

/// Keep-alive probe; checked against the first 8 characters of a frame
pub const PING_FRAME: &str = "__ping__";
/// Literal reply to [`PING_FRAME`]
pub const PONG_FRAME: &str = "__pong__";

/// Returns true if a raw frame is a keep-alive probe
pub fn is_ping(frame: &str) -> bool {
    frame.starts_with(PING_FRAME)
}

/// One user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub request_id: String,
    pub request_time: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    /// Raw text, or the file name of an uploaded document
    pub body: String,
    #[serde(default)]
    pub conv_type: ConversationType,
    /// Optional retrieval backend selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_type: Option<String>,
}

/// Progress of a request as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Work has started
    Istyping,
    /// Cumulative partial answer
    Proceeding,
    /// Diagnostic text, only sent when debug output is enabled
    Debug,
    Error,
    /// Final answer plus citation block
    Completed,
}

/// Status message sent back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub request_id: String,
    pub msg: String,
    pub status: MessageStatus,
}

impl OutboundMessage {
    pub fn new(request_id: impl Into<String>, status: MessageStatus, msg: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            msg: msg.into(),
            status,
        }
    }

    pub fn typing(request_id: impl Into<String>) -> Self {
        Self::new(request_id, MessageStatus::Istyping, "Proceeding...")
    }

    pub fn proceeding(request_id: impl Into<String>, partial: impl Into<String>) -> Self {
        Self::new(request_id, MessageStatus::Proceeding, partial)
    }

    pub fn debug(request_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(request_id, MessageStatus::Debug, msg)
    }

    pub fn error(request_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(request_id, MessageStatus::Error, msg)
    }

    pub fn completed(request_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(request_id, MessageStatus::Completed, msg)
    }
}
