//! Conversation pipeline
//!
//! Features:
//! - Per-user bounded conversation memory hydrated from the durable log
//! - Follow-up question revision with a malformed-output fallback
//! - Retrieval, rerank and grounded answer synthesis with streamed partials
//! - Document summaries for uploads
//! - In-band commands (reference/debug switches, memory reset, model listing)
//! - Round-robin model rotation, advanced once per successful request

pub mod clients;
pub mod commands;
pub mod handler;
pub mod memory;
pub mod reviser;
pub mod summarizer;
pub mod synthesizer;

#[cfg(test)]
mod testing;

pub use clients::{HttpModelClients, ModelClients};
pub use commands::{model_listing, Command};
pub use handler::{Reply, RequestHandler};
pub use memory::{ConversationMemory, Session, SessionHandle};
pub use reviser::{QueryReviser, Revision};
pub use summarizer::{csv_rows, DocumentKind, DocumentSummarizer};
pub use synthesizer::{AnswerSynthesizer, SynthesisMode};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// A message could not be delivered to the client
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ragchat_llm::LlmError> for AgentError {
    fn from(err: ragchat_llm::LlmError) -> Self {
        AgentError::Model(err.to_string())
    }
}

impl From<ragchat_rag::RagError> for AgentError {
    fn from(err: ragchat_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}

impl From<ragchat_core::Error> for AgentError {
    fn from(err: ragchat_core::Error) -> Self {
        use ragchat_core::Error;
        match err {
            Error::Transport(msg) => AgentError::Transport(msg),
            Error::Llm(msg) => AgentError::Model(msg),
            Error::Retrieval(msg) => AgentError::Retrieval(msg),
            Error::Persistence(msg) => AgentError::Persistence(msg),
            Error::Document(msg) => AgentError::Document(msg),
            Error::Protocol(msg) => AgentError::Protocol(msg),
            Error::Config(msg) => AgentError::Config(msg),
            Error::Internal(msg) => AgentError::Internal(msg),
        }
    }
}

impl From<AgentError> for ragchat_core::Error {
    fn from(err: AgentError) -> Self {
        use ragchat_core::Error;
        match err {
            AgentError::Transport(msg) => Error::Transport(msg),
            AgentError::Model(msg) => Error::Llm(msg),
            AgentError::Retrieval(msg) => Error::Retrieval(msg),
            AgentError::Persistence(msg) => Error::Persistence(msg),
            AgentError::Document(msg) => Error::Document(msg),
            AgentError::Protocol(msg) => Error::Protocol(msg),
            AgentError::Config(msg) => Error::Config(msg),
            AgentError::Internal(msg) => Error::Internal(msg),
        }
    }
}
