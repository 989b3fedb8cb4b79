//! Model integration
//!
//! Features:
//! - Ollama and OpenAI-compatible chat backends
//! - Bounded retry with exponential backoff
//! - Streaming token delivery over an mpsc channel
//! - Round-robin rotation across configured model profiles
//! - Language-aware prompt templates and tagged-output parsing

pub mod backend;
pub mod factory;
pub mod prompt;
pub mod router;

pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use factory::create_backend;
pub use prompt::{extract_tagged, Message, PromptBuilder, PromptTemplates, Role};
pub use router::ModelRouter;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model answered without the structure the caller asked for
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for ragchat_core::Error {
    fn from(err: LlmError) -> Self {
        ragchat_core::Error::Llm(err.to_string())
    }
}
