//! Model client construction
//!
//! The router only picks a [`ModelProfile`]; turning it into a chat backend
//! and an embedder happens here, behind a trait so tests can hand in mocks.

use std::sync::Arc;

use dashmap::DashMap;
use ragchat_config::LlmSettings;
use ragchat_core::ModelProfile;
use ragchat_llm::{create_backend, LlmBackend};
use ragchat_rag::{Embedder, OllamaEmbedder, OllamaEmbeddingConfig};

use crate::AgentError;

/// Builds the clients used for one request
pub trait ModelClients: Send + Sync {
    /// Chat model for `profile`
    fn chat(&self, profile: &ModelProfile) -> Result<Arc<dyn LlmBackend>, AgentError>;

    /// Embedding model served alongside `profile`
    fn embedder(&self, profile: &ModelProfile) -> Result<Arc<dyn Embedder>, AgentError>;
}

/// HTTP clients, built once per profile and reused
pub struct HttpModelClients {
    settings: LlmSettings,
    embedding_dim: usize,
    chats: DashMap<String, Arc<dyn LlmBackend>>,
    embedders: DashMap<String, Arc<dyn Embedder>>,
}

impl HttpModelClients {
    pub fn new(settings: LlmSettings, embedding_dim: usize) -> Self {
        Self {
            settings,
            embedding_dim,
            chats: DashMap::new(),
            embedders: DashMap::new(),
        }
    }

    fn key(profile: &ModelProfile) -> String {
        format!("{}|{}|{}", profile.region, profile.endpoint, profile.model_id)
    }
}

impl ModelClients for HttpModelClients {
    fn chat(&self, profile: &ModelProfile) -> Result<Arc<dyn LlmBackend>, AgentError> {
        let key = Self::key(profile);
        if let Some(backend) = self.chats.get(&key) {
            return Ok(backend.clone());
        }

        let backend = create_backend(profile, &self.settings)?;
        tracing::debug!(model = %profile, "Chat backend created");
        self.chats.insert(key, backend.clone());
        Ok(backend)
    }

    fn embedder(&self, profile: &ModelProfile) -> Result<Arc<dyn Embedder>, AgentError> {
        let key = format!("{}|{}", Self::key(profile), profile.embedding_model);
        if let Some(embedder) = self.embedders.get(&key) {
            return Ok(embedder.clone());
        }

        let config = OllamaEmbeddingConfig::from_profile(profile, self.embedding_dim);
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(config)?);
        self.embedders.insert(key, embedder.clone());
        Ok(embedder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_are_cached_per_profile() {
        let clients = HttpModelClients::new(LlmSettings::default(), 768);
        let a = ModelProfile::new("r1", "llama3", 512);
        let b = ModelProfile::new("r2", "llama3", 512);

        let first = clients.chat(&a).unwrap();
        let again = clients.chat(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = clients.chat(&b).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));

        let embedder = clients.embedder(&a).unwrap();
        assert_eq!(embedder.dim(), 768);
    }
}
