//! Vector Store using Qdrant
//!
//! Remote vector search over the shared (global namespace) collection.
//! The collection uses Euclidean distance so that scores are distances,
//! directly comparable with the reranker's cutoff.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{value::Kind, SearchPointsBuilder, Value},
    Qdrant,
};
use ragchat_config::{constants::endpoints, BackendKind, RagConfig};

use crate::embeddings::Embedder;
use crate::retriever::{RawHit, RetrievalBackend, VectorHit};
use crate::RagError;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    pub collection: String,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: ragchat_config::constants::rag::DEFAULT_COLLECTION.to_string(),
            api_key: None,
        }
    }
}

impl From<&RagConfig> for VectorStoreConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            endpoint: config.qdrant_endpoint.clone(),
            collection: config.qdrant_collection.clone(),
            api_key: config.qdrant_api_key.clone(),
        }
    }
}

/// Qdrant-backed retrieval backend
pub struct QdrantVectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
    embedder: Arc<dyn Embedder>,
}

impl QdrantVectorStore {
    /// Create a new vector store connection
    pub fn new(config: VectorStoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Check the collection is reachable
    pub async fn collection_exists(&self) -> Result<bool, RagError> {
        self.client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))
    }
}

fn string_field(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Map a point payload to a hit
///
/// Documents are stored with `text`, `name` and optional `page`/`uri`.
fn hit_from_payload(payload: &HashMap<String, Value>, distance: f32) -> VectorHit {
    let page = match payload.get("page").and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => u32::try_from(*n).ok(),
        Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as u32),
        Some(Kind::StringValue(s)) => s.parse().ok(),
        _ => None,
    };

    VectorHit {
        name: string_field(payload, "name").unwrap_or_default(),
        excerpt: string_field(payload, "text").unwrap_or_default(),
        page,
        uri: string_field(payload, "uri").filter(|u| !u.is_empty()),
        distance,
    }
}

#[async_trait]
impl RetrievalBackend for QdrantVectorStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Opensearch
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawHit>, RagError> {
        let embedding = self.embedder.embed(query).await?;

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.collection, embedding, top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| RawHit::Opensearch(hit_from_payload(&point.payload, point.score)))
            .collect())
    }
}
