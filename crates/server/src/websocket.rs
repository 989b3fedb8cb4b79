//! WebSocket Handler
//!
//! One connection carries any number of requests. Each decoded request runs
//! on its own task so keep-alive probes are answered while an answer is
//! still streaming; every status message goes back over the same socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use ragchat_agent::RequestHandler;
use ragchat_core::{
    is_ping, InboundMessage, MessageSink, OutboundMessage, RequestContext, PONG_FRAME,
};

use crate::state::AppState;
use crate::ServerError;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// [`MessageSink`] over the write half of a socket
#[derive(Clone)]
pub struct WsSink {
    sender: WsSender,
}

impl WsSink {
    fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    /// Send a raw text frame
    pub async fn send_text(&self, text: impl Into<String>) -> ragchat_core::Result<()> {
        self.sender
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ragchat_core::Error::Transport(e.to_string()))
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&self, message: OutboundMessage) -> ragchat_core::Result<()> {
        let json = serde_json::to_string(&message)
            .map_err(|e| ragchat_core::Error::Protocol(e.to_string()))?;
        self.send_text(json).await
    }
}

/// Decode one text frame into a request context and its body
pub fn decode_frame(
    connection_id: &str,
    frame: &str,
) -> Result<(RequestContext, String), ServerError> {
    let inbound: InboundMessage = serde_json::from_str(frame)
        .map_err(|e| ServerError::InvalidRequest(format!("malformed message: {}", e)))?;
    let ctx = RequestContext::from_inbound(connection_id, &inbound)
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    Ok((ctx, inbound.body))
}

/// Run one request with a bounded lifetime
///
/// Pipeline failures have already been reported to the client by the
/// handler; only a timeout needs an error message from here.
pub async fn run_request(
    handler: &RequestHandler,
    ctx: RequestContext,
    body: String,
    sink: &dyn MessageSink,
    limit: Duration,
) {
    match tokio::time::timeout(limit, handler.handle(&ctx, &body, sink)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::debug!(request_id = %ctx.request_id, error = %e, "Request ended with error");
        }
        Err(_) => {
            metrics::counter!("ragchat_request_errors_total").increment(1);
            tracing::warn!(
                request_id = %ctx.request_id,
                user_id = %ctx.user_id,
                limit_secs = limit.as_secs(),
                "Request timed out"
            );
            let msg = format!("request timed out after {}s", limit.as_secs());
            if let Err(e) = sink.send(OutboundMessage::error(&ctx.request_id, msg)).await {
                tracing::debug!(error = %e, "Could not deliver timeout message");
            }
        }
    }
}

pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
    ) -> Result<Response, ServerError> {
        let guard = state.try_connect().ok_or_else(|| {
            ServerError::Unavailable(format!(
                "{} connections open",
                state.config.server.max_connections
            ))
        })?;

        Ok(ws.on_upgrade(move |socket| async move {
            Self::handle_socket(socket, state).await;
            drop(guard);
        }))
    }

    async fn handle_socket(socket: WebSocket, state: AppState) {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let limit = Duration::from_secs(state.config.server.timeout_seconds);
        let (sender, mut receiver) = socket.split();
        let sink = WsSink::new(sender);

        tracing::info!(
            connection_id = %connection_id,
            open = state.connection_count(),
            "WebSocket connected"
        );

        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            };

            if is_ping(&text) {
                if let Err(e) = sink.send_text(PONG_FRAME).await {
                    tracing::debug!(error = %e, "Failed to answer keep-alive");
                    break;
                }
                continue;
            }

            match decode_frame(&connection_id, &text) {
                Ok((ctx, body)) => {
                    let handler = state.handler.clone();
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        run_request(&handler, ctx, body, &sink, limit).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Rejected frame");
                    if sink.send(OutboundMessage::error("", e.to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_agent::{AgentError, ModelClients};
    use ragchat_config::Settings;
    use ragchat_core::{
        ConversationType, DocumentStore, InteractionType, Language, MessageStatus, ModelProfile,
        RecordingSink,
    };
    use ragchat_llm::{GenerationResult, LlmBackend, LlmError, ModelRouter};
    use ragchat_persistence::InMemoryHistoryStore;
    use ragchat_rag::{Embedder, EmbeddingConfig, RetrieverFanout, SimpleEmbedder};

    /// A model that never produces a token
    struct StalledModel;

    #[async_trait]
    impl LlmBackend for StalledModel {
        async fn generate(
            &self,
            _messages: &[ragchat_llm::Message],
        ) -> Result<GenerationResult, LlmError> {
            std::future::pending().await
        }

        async fn generate_stream(
            &self,
            _messages: &[ragchat_llm::Message],
            _tx: tokio::sync::mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            std::future::pending().await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    struct StalledClients;

    impl ModelClients for StalledClients {
        fn chat(&self, _profile: &ModelProfile) -> Result<Arc<dyn LlmBackend>, AgentError> {
            Ok(Arc::new(StalledModel))
        }

        fn embedder(&self, _profile: &ModelProfile) -> Result<Arc<dyn Embedder>, AgentError> {
            Ok(Arc::new(SimpleEmbedder::new(EmbeddingConfig::default())))
        }
    }

    struct NoDocuments;

    #[async_trait]
    impl DocumentStore for NoDocuments {
        async fn load_text(&self, name: &str) -> ragchat_core::Result<String> {
            Err(ragchat_core::Error::Document(name.to_string()))
        }

        fn namespace(&self) -> &str {
            "docs"
        }
    }

    fn stalled_handler() -> RequestHandler {
        let settings = Settings::default();
        let router = Arc::new(
            ModelRouter::new(vec![
                ModelProfile::new("r1", "model-a", 256),
                ModelProfile::new("r2", "model-b", 256),
            ])
            .unwrap(),
        );
        RequestHandler::new(
            &settings,
            router,
            Arc::new(StalledClients),
            RetrieverFanout::from_config(Vec::new(), &settings.rag),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(NoDocuments),
        )
    }

    #[tokio::test]
    async fn test_timed_out_request_reports_error_and_keeps_rotation() {
        let handler = stalled_handler();
        let sink = RecordingSink::new();
        let ctx = RequestContext {
            connection_id: "conn".to_string(),
            user_id: "u-1".to_string(),
            request_id: "r-slow".to_string(),
            request_time: chrono::Utc::now(),
            interaction: InteractionType::Text,
            conversation: ConversationType::Normal,
            rag_type: None,
            language: Language::English,
        };

        run_request(
            &handler,
            ctx,
            "hello".to_string(),
            &sink,
            Duration::from_millis(50),
        )
        .await;

        let sent = sink.messages();
        let last = sent.last().unwrap();
        assert_eq!(last.status, MessageStatus::Error);
        assert_eq!(last.request_id, "r-slow");
        assert!(sent.iter().all(|m| m.status != MessageStatus::Completed));
        assert_eq!(handler.router().current_index(), 0);
    }

    #[test]
    fn test_decode_frame() {
        let frame = r#"{
            "user_id": "u-1",
            "request_id": "r-1",
            "request_time": "2024-03-01 09:30:00",
            "type": "text",
            "body": "환불 규정이 어떻게 되나요?",
            "conv_type": "qa",
            "rag_type": " faiss "
        }"#;

        let (ctx, body) = decode_frame("conn", frame).unwrap();
        assert_eq!(ctx.connection_id, "conn");
        assert_eq!(ctx.interaction, InteractionType::Text);
        assert_eq!(ctx.conversation, ConversationType::Qa);
        assert_eq!(ctx.rag_type.as_deref(), Some("faiss"));
        assert_eq!(
            ctx.request_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-03-01 09:30:00"
        );
        assert_eq!(body, "환불 규정이 어떻게 되나요?");
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(
            decode_frame("c", "not json"),
            Err(ServerError::InvalidRequest(_))
        ));

        let bad_time = r#"{"user_id":"u","request_id":"r","request_time":"yesterday","type":"text","body":"hi"}"#;
        assert!(matches!(
            decode_frame("c", bad_time),
            Err(ServerError::InvalidRequest(_))
        ));

        let bad_type = r#"{"user_id":"u","request_id":"r","request_time":"2024-03-01 09:30:00","type":"audio","body":"hi"}"#;
        assert!(decode_frame("c", bad_type).is_err());
    }

    #[test]
    fn test_ping_is_not_decoded() {
        assert!(is_ping("__ping__"));
        assert!(is_ping("__ping__ keepalive"));
        assert!(!is_ping(r#"{"body":"__ping__"}"#));
    }
}
