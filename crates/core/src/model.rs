//! Model endpoint descriptors

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a model endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi,
}

/// Immutable descriptor of one configured model endpoint
///
/// The process holds an ordered list of these and rotates through them,
/// one step per successfully completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Region or deployment id the endpoint lives in
    pub region: String,
    /// Model id passed to the endpoint
    pub model_id: String,
    /// Maximum tokens the model may generate per call
    pub max_output_tokens: usize,
    #[serde(default)]
    pub provider: ModelProvider,
    /// Base URL of the endpoint
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Embedding model served by the same endpoint
    pub embedding_model: String,
}

impl ModelProfile {
    pub fn new(
        region: impl Into<String>,
        model_id: impl Into<String>,
        max_output_tokens: usize,
    ) -> Self {
        Self {
            region: region.into(),
            model_id: model_id.into(),
            max_output_tokens,
            provider: ModelProvider::default(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            embedding_model: "nomic-embed-text".to_string(),
        }
    }

    pub fn with_endpoint(mut self, provider: ModelProvider, endpoint: impl Into<String>) -> Self {
        self.provider = provider;
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.model_id, self.region)
    }
}
