//! Retrieval backend seam
//!
//! Each backend family returns its own native hit shape; the normalizer maps
//! them onto [`crate::RetrievedDocument`].

use async_trait::async_trait;
use ragchat_config::BackendKind;

use crate::managed_index::IndexItem;
use crate::RagError;

/// A hit from a vector search backend
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Document name (`name` metadata)
    pub name: String,
    pub excerpt: String,
    pub page: Option<u32>,
    pub uri: Option<String>,
    /// Distance to the query, lower is closer
    pub distance: f32,
}

/// Backend-native result, one variant per backend family
#[derive(Debug, Clone, PartialEq)]
pub enum RawHit {
    ManagedIndex(IndexItem),
    Faiss(VectorHit),
    Opensearch(VectorHit),
}

/// One retrieval source
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Search for `query`, returning at most `top_k` hits in backend rank order
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawHit>, RagError>;
}
