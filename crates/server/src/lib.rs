//! ragchat server
//!
//! WebSocket chat endpoint plus health, readiness and metrics routes.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use state::AppState;
pub use websocket::{WebSocketHandler, WsSink};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection limit reached
    #[error("Server busy: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::WebSocket(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Startup(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ragchat_config::ConfigError> for ServerError {
    fn from(err: ragchat_config::ConfigError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<ragchat_persistence::PersistenceError> for ServerError {
    fn from(err: ragchat_persistence::PersistenceError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<ragchat_llm::LlmError> for ServerError {
    fn from(err: ragchat_llm::LlmError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<ragchat_agent::AgentError> for ServerError {
    fn from(err: ragchat_agent::AgentError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::Unavailable("full".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
