//! HTTP Endpoints
//!
//! Health, readiness and metrics routes next to the WebSocket endpoint.

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );
    let ws_path = state.config.server.ws_path.clone();

    Router::new()
        .route(&ws_path, get(WebSocketHandler::handle))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn localhost_only() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build CORS layer from configured origins
///
/// Disabled CORS is permissive; no usable origin falls back to localhost.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return localhost_only();
    }

    tracing::info!("CORS configured with {} origins", parsed.len());
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Liveness: the process is up and serving
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": state.uptime_secs(),
            "connections": state.connection_count(),
        })),
    )
}

/// Readiness: models are configured, every enabled backend is registered
/// and the current model endpoint answers
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let handler = &state.handler;
    let mut ready = true;

    let configured = &state.config.rag.capabilities;
    let registered = handler.fanout().available();
    let missing: Vec<String> = configured
        .iter()
        .filter(|kind| !registered.contains(kind))
        .map(|kind| kind.to_string())
        .collect();
    if !missing.is_empty() {
        ready = false;
    }

    let current = handler.router().current();
    let model_status = match handler.model_available(&current).await {
        true => "ok",
        false => {
            ready = false;
            "unreachable"
        }
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "checks": {
                "model": {
                    "status": model_status,
                    "current": current.to_string(),
                    "profiles": handler.router().profiles().len(),
                },
                "retrieval": {
                    "status": if missing.is_empty() { "ok" } else { "degraded" },
                    "registered": registered.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                    "missing": missing,
                },
                "history": {
                    "status": "ok",
                    "store": handler.history_store_name(),
                },
                "sessions": handler.memory().session_count(),
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layers_build() {
        let _ = build_cors_layer(&[], true);
        let _ = build_cors_layer(&["not a header\u{0}".to_string()], true);
        let _ = build_cors_layer(&["https://chat.example.com".to_string()], true);
        let _ = build_cors_layer(&[], false);
    }
}
