//! Main settings module

use config::{Config, Environment, File};
use ragchat_core::{ModelProfile, ModelProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::constants::{endpoints, llm, memory, rag};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Model endpoints, rotated through in order
    #[serde(default = "default_models")]
    pub models: Vec<ModelProfile>,

    /// Sampling and retry parameters shared by every model endpoint
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            models: default_models(),
            llm: LlmSettings::default(),
            memory: MemoryConfig::default(),
            rag: RagConfig::default(),
            persistence: PersistenceConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_models() -> Vec<ModelProfile> {
    vec![ModelProfile::new("local", "llama3.1:8b", llm::DEFAULT_MAX_OUTPUT_TOKENS)
        .with_endpoint(ModelProvider::Ollama, endpoints::OLLAMA_DEFAULT)]
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_models()?;
        self.validate_memory()?;
        self.validate_rag()?;
        self.validate_server()?;
        Ok(())
    }

    fn validate_models(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "models".to_string(),
                message: "At least one model profile is required".to_string(),
            });
        }

        for (i, profile) in self.models.iter().enumerate() {
            if profile.model_id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("models[{}].model_id", i),
                    message: "Must not be empty".to_string(),
                });
            }
            if profile.endpoint.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("models[{}].endpoint", i),
                    message: "Must not be empty".to_string(),
                });
            }
            if profile.max_output_tokens == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("models[{}].max_output_tokens", i),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.llm.top_p) {
            return Err(ConfigError::InvalidValue {
                field: "llm.top_p".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", self.llm.top_p),
            });
        }

        Ok(())
    }

    fn validate_memory(&self) -> Result<(), ConfigError> {
        if self.memory.window_pairs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory.window_pairs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if self.memory.history_days < 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory.history_days".to_string(),
                message: format!("Must not be negative, got {}", self.memory.history_days),
            });
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.top_k".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if rag.relevance_threshold <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.relevance_threshold".to_string(),
                message: format!("Must be positive, got {}", rag.relevance_threshold),
            });
        }

        if rag.capabilities.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rag.capabilities".to_string(),
                message: "At least one retrieval backend is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for kind in &rag.capabilities {
            if !seen.insert(*kind) {
                return Err(ConfigError::InvalidValue {
                    field: "rag.capabilities".to_string(),
                    message: format!("Backend '{}' listed more than once", kind),
                });
            }
        }

        let index = &rag.managed_index;
        if index.faq_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.managed_index.faq_page_size".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if index.faq_tiers.is_empty() || index.fallback_tiers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rag.managed_index".to_string(),
                message: "Confidence tier sets must not be empty".to_string(),
            });
        }

        if rag.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.vector_dim".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if !server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: format!("Must start with '/', got {}", server.ws_path),
            });
        }

        if self.environment.is_strict() && server.cors_enabled && server.cors_origins.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.cors_origins".to_string(),
                message: "CORS origins must be configured outside development".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_connections() -> usize {
    1000
}
fn default_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Sampling and retry parameters applied to every model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_sampling_top_k")]
    pub top_k: u32,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay, doubled on each further attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_temperature() -> f32 {
    llm::TEMPERATURE
}
fn default_top_p() -> f32 {
    llm::TOP_P
}
fn default_sampling_top_k() -> u32 {
    llm::TOP_K
}
fn default_stop_sequences() -> Vec<String> {
    vec![llm::STOP_SEQUENCE.to_string()]
}
fn default_llm_timeout() -> u64 {
    llm::REQUEST_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    llm::MAX_RETRIES
}
fn default_initial_backoff() -> u64 {
    llm::INITIAL_BACKOFF_MS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_sampling_top_k(),
            stop_sequences: default_stop_sequences(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Exchanges kept per session (a session holds at most twice this many turns)
    #[serde(default = "default_window_pairs")]
    pub window_pairs: usize,

    /// Age limit of durable history replayed into a new session
    #[serde(default = "default_history_days")]
    pub history_days: i64,

    /// Replayed assistant text is cut to this many characters
    #[serde(default = "default_replay_max_chars")]
    pub replay_max_chars: usize,
}

fn default_window_pairs() -> usize {
    memory::WINDOW_PAIRS
}
fn default_history_days() -> i64 {
    memory::HISTORY_DAYS
}
fn default_replay_max_chars() -> usize {
    memory::REPLAY_MAX_CHARS
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_pairs: default_window_pairs(),
            history_days: default_history_days(),
            replay_max_chars: default_replay_max_chars(),
        }
    }
}

/// Retrieval backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Managed document index service with retrieve and query APIs
    ManagedIndex,
    /// Process-local flat vector index
    Faiss,
    /// Remote vector search store
    Opensearch,
}

impl BackendKind {
    /// Identifier shown in citations and logs
    pub fn id(&self) -> &'static str {
        match self {
            Self::ManagedIndex => "kendra",
            Self::Faiss => "faiss",
            Self::Opensearch => "opensearch",
        }
    }

    /// Resolve a client-supplied selector (`rag_type`) to a backend
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "kendra" | "managed_index" => Some(Self::ManagedIndex),
            "faiss" => Some(Self::Faiss),
            "opensearch" => Some(Self::Opensearch),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// How the fan-out stage runs its backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FanoutStrategy {
    /// One backend after another, in configured order
    #[default]
    Sequential,
    /// One task per backend, joined in configured order
    Concurrent,
}

/// What a backend failure does to the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the whole fetch
    #[default]
    FailFast,
    /// Failed backends are logged and skipped; fails only if every backend failed
    Partial,
}

/// Categorical confidence reported by the managed index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    NotAvailable,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryHigh => "VERY_HIGH",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::NotAvailable => "NOT_AVAILABLE",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Managed document index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedIndexConfig {
    #[serde(default = "default_index_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub index_id: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Value of the `_language_code` attribute filter
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Page size of the FAQ lookup run after a non-empty retrieve
    #[serde(default = "default_faq_page_size")]
    pub faq_page_size: usize,

    /// Confidence levels accepted from the FAQ lookup
    #[serde(default = "default_faq_tiers")]
    pub faq_tiers: Vec<ConfidenceLevel>,

    /// Confidence levels accepted from the fallback query
    #[serde(default = "default_fallback_tiers")]
    pub fallback_tiers: Vec<ConfidenceLevel>,

    #[serde(default = "default_index_timeout")]
    pub timeout_seconds: u64,
}

fn default_index_endpoint() -> String {
    endpoints::MANAGED_INDEX_DEFAULT.to_string()
}
fn default_language_code() -> String {
    rag::INDEX_LANGUAGE_CODE.to_string()
}
fn default_faq_page_size() -> usize {
    rag::FAQ_PAGE_SIZE
}
fn default_faq_tiers() -> Vec<ConfidenceLevel> {
    vec![ConfidenceLevel::VeryHigh, ConfidenceLevel::High]
}
fn default_fallback_tiers() -> Vec<ConfidenceLevel> {
    vec![
        ConfidenceLevel::VeryHigh,
        ConfidenceLevel::High,
        ConfidenceLevel::Medium,
    ]
}
fn default_index_timeout() -> u64 {
    30
}

impl Default for ManagedIndexConfig {
    fn default() -> Self {
        Self {
            endpoint: default_index_endpoint(),
            index_id: String::new(),
            api_key: None,
            language_code: default_language_code(),
            faq_page_size: default_faq_page_size(),
            faq_tiers: default_faq_tiers(),
            fallback_tiers: default_fallback_tiers(),
            timeout_seconds: default_index_timeout(),
        }
    }
}

/// Retrieval, reranking and citation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Documents requested per backend and kept after reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Reranked documents are kept iff their distance is strictly below this
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: i64,

    #[serde(default)]
    pub fanout: FanoutStrategy,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Enabled backends, in the order their results are merged
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<BackendKind>,

    /// Initial state of the citation switch
    #[serde(default = "default_true")]
    pub reference_enabled: bool,

    /// Initial state of the debug message switch
    #[serde(default)]
    pub debug_enabled: bool,

    /// Prefix for links built from a document title
    #[serde(default)]
    pub citation_base_uri: String,

    #[serde(default)]
    pub managed_index: ManagedIndexConfig,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Embedding dimension of the configured embedding models
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Documents loaded into the in-memory index at startup, by file name
    #[serde(default)]
    pub bootstrap_documents: Vec<String>,
}

fn default_top_k() -> usize {
    rag::DEFAULT_TOP_K
}
fn default_relevance_threshold() -> i64 {
    rag::RELEVANCE_THRESHOLD
}
fn default_capabilities() -> Vec<BackendKind> {
    vec![
        BackendKind::ManagedIndex,
        BackendKind::Opensearch,
        BackendKind::Faiss,
    ]
}
fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    rag::DEFAULT_COLLECTION.to_string()
}
fn default_vector_dim() -> usize {
    rag::DEFAULT_VECTOR_DIM
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            fanout: FanoutStrategy::default(),
            failure_policy: FailurePolicy::default(),
            capabilities: default_capabilities(),
            reference_enabled: true,
            debug_enabled: false,
            citation_base_uri: String::new(),
            managed_index: ManagedIndexConfig::default(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            vector_dim: default_vector_dim(),
            bootstrap_documents: Vec::new(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory history)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,

    /// Directory holding uploaded documents
    #[serde(default = "default_document_root")]
    pub document_root: String,

    /// Namespace prefix documents are addressed under
    #[serde(default = "default_document_namespace")]
    pub document_namespace: String,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}
fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "ragchat".to_string())
}
fn default_replication_factor() -> u8 {
    1
}
fn default_document_root() -> String {
    "data".to_string()
}
fn default_document_namespace() -> String {
    "docs".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
            document_root: default_document_root(),
            document_namespace: default_document_namespace(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    /// OTLP endpoint for traces
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (RAGCHAT_ prefix, `__` between sections)
/// 2. config/{env}.{toml,yaml} (if env specified)
/// 3. config/default.{toml,yaml}
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("RAGCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        models = settings.models.len(),
        backends = ?settings.rag.capabilities,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.rag.top_k, 10);
        assert_eq!(settings.rag.relevance_threshold, 200);
        assert_eq!(settings.memory.window_pairs, 10);
        assert_eq!(settings.memory.replay_max_chars, 100);
        assert_eq!(settings.models.len(), 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_models_validation() {
        let mut settings = Settings::default();
        settings.models.clear();
        assert!(settings.validate_models().is_err());

        settings.models = default_models();
        settings.models[0].max_output_tokens = 0;
        assert!(settings.validate_models().is_err());
    }

    #[test]
    fn test_rag_validation_top_k() {
        let mut settings = Settings::default();
        settings.rag.top_k = 0;
        assert!(settings.validate_rag().is_err());
    }

    #[test]
    fn test_rag_validation_duplicate_backend() {
        let mut settings = Settings::default();
        settings.rag.capabilities = vec![BackendKind::Faiss, BackendKind::Faiss];
        assert!(settings.validate_rag().is_err());

        settings.rag.capabilities.clear();
        assert!(settings.validate_rag().is_err());
    }

    #[test]
    fn test_rag_validation_tiers() {
        let mut settings = Settings::default();
        settings.rag.managed_index.faq_tiers.clear();
        assert!(settings.validate_rag().is_err());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        settings.server.ws_path = "ws".to_string();
        assert!(settings.validate_server().is_err());
        settings.server.ws_path = "/ws".to_string();

        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate_server().is_err());
        settings.server.cors_origins = vec!["https://chat.example.com".to_string()];
        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_backend_selector() {
        assert_eq!(BackendKind::from_selector("kendra"), Some(BackendKind::ManagedIndex));
        assert_eq!(BackendKind::from_selector(" FAISS "), Some(BackendKind::Faiss));
        assert_eq!(BackendKind::from_selector("all"), None);
        assert_eq!(BackendKind::Opensearch.id(), "opensearch");
    }

    #[test]
    fn test_confidence_level_serde() {
        let levels: Vec<ConfidenceLevel> = serde_json::from_str(r#"["VERY_HIGH","MEDIUM"]"#).unwrap();
        assert_eq!(levels, vec![ConfidenceLevel::VeryHigh, ConfidenceLevel::Medium]);
        assert_eq!(ConfidenceLevel::High.to_string(), "HIGH");
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[rag]
top_k = 4
fanout = "concurrent"
failure_policy = "partial"
capabilities = ["faiss", "opensearch"]

[memory]
window_pairs = 3

[[models]]
region = "us-west-2"
model_id = "claude-3"
max_output_tokens = 4096
provider = "openai"
endpoint = "http://localhost:8000/v1"
embedding_model = "text-embed"
"#
        )
        .unwrap();

        let settings = load_settings_from(dir.path().to_str().unwrap(), None).unwrap();
        assert_eq!(settings.rag.top_k, 4);
        assert_eq!(settings.rag.fanout, FanoutStrategy::Concurrent);
        assert_eq!(settings.rag.failure_policy, FailurePolicy::Partial);
        assert_eq!(settings.rag.capabilities, vec![BackendKind::Faiss, BackendKind::Opensearch]);
        assert_eq!(settings.memory.window_pairs, 3);
        assert_eq!(settings.models[0].provider, ModelProvider::OpenAi);
        // untouched sections keep their defaults
        assert_eq!(settings.rag.relevance_threshold, 200);
    }
}
