//! ragchat server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ragchat_agent::{HttpModelClients, ModelClients, RequestHandler};
use ragchat_config::{load_settings, BackendKind, Settings};
use ragchat_core::DocumentStore;
use ragchat_llm::ModelRouter;
use ragchat_rag::{
    Embedder, HttpManagedIndex, IndexPolicy, InMemoryVectorStore, ManagedIndexRetriever,
    QdrantVectorStore, RetrievalBackend, RetrieverFanout, VectorStoreConfig,
};
use ragchat_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // env vars > config/{env} > config/default > defaults
    let env = std::env::var("RAGCHAT_ENV").ok();
    let config = load_settings(env.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!("Starting ragchat server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        models = config.models.len(),
        backends = ?config.rag.capabilities,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let persistence = ragchat_persistence::init(&config.persistence)
        .await
        .context("Failed to initialize persistence")?;
    tracing::info!(
        history = persistence.history.name(),
        documents = persistence.documents.namespace(),
        "Persistence initialized"
    );

    let router = Arc::new(ModelRouter::new(config.models.clone())?);
    let clients = Arc::new(HttpModelClients::new(
        config.llm.clone(),
        config.rag.vector_dim,
    ));

    // Vector backends are queried with the first profile's embedding model
    let embedder = clients.embedder(&router.current())?;
    let backends = build_backends(&config, embedder, persistence.documents.as_ref()).await;
    let fanout = RetrieverFanout::from_config(backends, &config.rag);
    tracing::info!(
        registered = ?fanout.available(),
        strategy = ?fanout.strategy(),
        "Retrieval fan-out ready"
    );

    let handler = RequestHandler::new(
        &config,
        router,
        clients,
        fanout,
        persistence.history,
        persistence.documents,
    );
    let state = AppState::new(config.clone(), handler);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!(ws_path = %config.server.ws_path, "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// One retrieval backend per configured capability
///
/// A backend that cannot be constructed is skipped with an error log; the
/// readiness route reports it as missing. The in-memory index is filled from
/// `rag.bootstrap_documents`.
async fn build_backends(
    config: &Settings,
    embedder: Arc<dyn Embedder>,
    documents: &dyn DocumentStore,
) -> Vec<Arc<dyn RetrievalBackend>> {
    let mut backends: Vec<Arc<dyn RetrievalBackend>> = Vec::new();

    for kind in &config.rag.capabilities {
        let backend: Result<Arc<dyn RetrievalBackend>, ragchat_rag::RagError> = match kind {
            BackendKind::ManagedIndex => {
                let index = &config.rag.managed_index;
                HttpManagedIndex::new(index).map(|api| {
                    Arc::new(ManagedIndexRetriever::new(
                        Arc::new(api),
                        IndexPolicy::from(index),
                    )) as Arc<dyn RetrievalBackend>
                })
            }
            BackendKind::Faiss => {
                let store = InMemoryVectorStore::new(embedder.clone());
                store
                    .bootstrap(documents, &config.rag.bootstrap_documents)
                    .await
                    .map(|_| Arc::new(store) as Arc<dyn RetrievalBackend>)
            }
            BackendKind::Opensearch => {
                QdrantVectorStore::new(VectorStoreConfig::from(&config.rag), embedder.clone())
                    .map(|store| Arc::new(store) as Arc<dyn RetrievalBackend>)
            }
        };

        match backend {
            Ok(backend) => {
                tracing::info!(backend = %kind, "Retrieval backend registered");
                backends.push(backend);
            }
            Err(e) => tracing::error!(backend = %kind, error = %e, "Retrieval backend unavailable"),
        }
    }

    backends
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn env_filter(config: &Settings) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("ragchat={level},ragchat_agent={level},ragchat_rag={level},ragchat_llm={level},ragchat_server={level},tower_http=info").into()
    })
}

/// Initialize tracing (with optional OpenTelemetry when feature enabled)
#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "ragchat"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                    return;
                }
                Err(e) => eprintln!("Failed to initialize OpenTelemetry: {}. Falling back.", e),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

/// Initialize tracing (console only - telemetry feature disabled)
#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
