//! Retrieval across heterogeneous backends
//!
//! Features:
//! - Managed document index with retrieve, FAQ and fallback query policy
//! - Remote vector search via Qdrant
//! - Process-local flat L2 vector index
//! - Sequential or concurrent fan-out with deterministic merge order
//! - One normalized document schema for every backend family
//! - Embedding-distance rerank with a fixed relevance cutoff
//! - Backend-specific citation rendering

pub mod citation;
pub mod document;
pub mod embeddings;
pub mod fanout;
pub mod managed_index;
pub mod memory_store;
pub mod normalizer;
pub mod ollama_embeddings;
pub mod reranker;
pub mod retriever;
pub mod vector_store;

pub use citation::CitationFormatter;
pub use document::{
    context_from, Confidence, DocumentOrigin, IndexHit, RankedDocument, RetrievedDocument,
};
pub use embeddings::{Embedder, EmbeddingConfig, SimpleEmbedder};
pub use fanout::RetrieverFanout;
pub use managed_index::{
    HttpManagedIndex, IndexItem, IndexPolicy, ManagedIndexApi, ManagedIndexRetriever,
};
pub use memory_store::{FlatL2Index, InMemoryVectorStore, StoredDocument};
pub use normalizer::ResultNormalizer;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use reranker::Reranker;
pub use retriever::{RawHit, RetrievalBackend, VectorHit};
pub use vector_store::{QdrantVectorStore, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    /// A retrieval backend call failed
    #[error("Backend {backend} failed: {message}")]
    Backend { backend: String, message: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A fan-out worker panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),
}

impl RagError {
    /// Attribute an error to the backend that raised it
    pub fn backend(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RagError::Backend {
            backend: backend.into(),
            message: err.to_string(),
        }
    }
}

impl From<RagError> for ragchat_core::Error {
    fn from(err: RagError) -> Self {
        ragchat_core::Error::Retrieval(err.to_string())
    }
}
