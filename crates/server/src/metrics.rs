//! Prometheus metrics
//!
//! The recorder is installed once per process; `/metrics` renders whatever
//! the pipeline crates recorded through the `metrics` facade.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder
///
/// Returns `None` if a recorder was already installed by someone else.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe();
            let _ = PROMETHEUS.set(handle.clone());
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

fn describe() {
    metrics::describe_counter!("ragchat_requests_total", "Requests received, by conversation type");
    metrics::describe_counter!("ragchat_request_errors_total", "Requests that ended in an error");
    metrics::describe_histogram!(
        "ragchat_request_duration_seconds",
        metrics::Unit::Seconds,
        "Time from request receipt to the completed message"
    );
    metrics::describe_histogram!(
        "ragchat_retrieval_documents",
        "Documents returned per retrieval backend call"
    );
    metrics::describe_histogram!(
        "ragchat_retained_documents",
        "Documents kept by the reranker per request"
    );
    metrics::describe_gauge!("ragchat_ws_connections", "Open WebSocket connections");
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
