//! Core traits and types for the conversational retrieval backend
//!
//! This crate provides foundational types used across all other crates:
//! - Error types
//! - Conversation turns and the shared language predicate
//! - Model profiles and per-request context
//! - Wire protocol messages exchanged with clients
//! - Collaborator traits (durable history, document store, outbound sink)

pub mod conversation;
pub mod error;
pub mod language;
pub mod model;
pub mod protocol;
pub mod request;
pub mod traits;

pub use conversation::{Turn, TurnRole};
pub use error::{Error, Result};
pub use language::{hangul_count, is_korean, Language};
pub use model::{ModelProfile, ModelProvider};
pub use protocol::{is_ping, InboundMessage, MessageStatus, OutboundMessage, PING_FRAME, PONG_FRAME};
pub use request::{
    format_request_time, parse_request_time, ConversationType, InteractionType, RequestContext,
};
pub use traits::{DocumentStore, HistoryEntry, HistoryStore, MessageSink, RecordingSink};
