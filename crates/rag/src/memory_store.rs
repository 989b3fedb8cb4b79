//! Process-local vector search
//!
//! [`FlatL2Index`] is an exact nearest-neighbour index scored by squared
//! Euclidean distance. It backs both the in-memory retrieval backend and the
//! reranker's per-request candidate index.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ragchat_config::BackendKind;
use ragchat_core::DocumentStore;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::retriever::{RawHit, RetrievalBackend, VectorHit};
use crate::RagError;

/// Exact L2 index over fixed-dimension vectors
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
        }
    }

    /// Build an index from vectors that all share one dimension
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self, RagError> {
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        let mut index = Self::new(dim);
        for vector in vectors {
            index.add(vector)?;
        }
        Ok(index)
    }

    /// Add a vector, returning its position
    pub fn add(&mut self, vector: Vec<f32>) -> Result<usize, RagError> {
        if self.vectors.is_empty() && self.dim == 0 {
            self.dim = vector.len();
        }
        if vector.len() != self.dim {
            return Err(RagError::Index(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dim
            )));
        }
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The `k` nearest vectors as `(position, distance)`, closest first
    ///
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, RagError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(RagError::Index(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }
}

/// A document held by the in-memory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl StoredDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            page: None,
            uri: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

#[derive(Default)]
struct StoreState {
    index: FlatL2Index,
    documents: Vec<StoredDocument>,
}

/// In-memory vector backend
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    state: RwLock<StoreState>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Embed and add documents
    pub async fn add_documents(&self, documents: Vec<StoredDocument>) -> Result<usize, RagError> {
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut state = self.state.write();
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            state.index.add(embedding)?;
            state.documents.push(document);
        }
        Ok(state.documents.len())
    }

    /// Load `names` from `store`, one entry per blank-line separated passage
    ///
    /// Documents that cannot be read are skipped. Returns the number of
    /// passages added.
    pub async fn bootstrap(
        &self,
        store: &dyn DocumentStore,
        names: &[String],
    ) -> Result<usize, RagError> {
        let mut passages = Vec::new();
        for name in names {
            match store.load_text(name).await {
                Ok(text) => passages.extend(
                    split_passages(&text)
                        .into_iter()
                        .map(|passage| StoredDocument::new(name.as_str(), passage)),
                ),
                Err(e) => {
                    tracing::warn!(document = %name, error = %e, "Skipping bootstrap document");
                }
            }
        }

        if passages.is_empty() {
            return Ok(0);
        }
        let added = passages.len();
        self.add_documents(passages).await?;
        tracing::info!(documents = names.len(), passages = added, "In-memory index loaded");
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn split_passages(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl RetrievalBackend for InMemoryVectorStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Faiss
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawHit>, RagError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;

        let state = self.state.read();
        let neighbours = state.index.search(&embedding, top_k)?;
        Ok(neighbours
            .into_iter()
            .filter_map(|(position, distance)| {
                state.documents.get(position).map(|doc| {
                    RawHit::Faiss(VectorHit {
                        name: doc.name.clone(),
                        excerpt: doc.content.clone(),
                        page: doc.page,
                        uri: doc.uri.clone(),
                        distance,
                    })
                })
            })
            .collect())
    }
}
