//! Embedding-distance reranker
//!
//! Backends report confidence in incompatible units, so every candidate is
//! rescored the same way: the candidates' excerpts go into a throwaway flat
//! L2 index, the question is embedded with the same embedder, and the
//! nearest `top_k` neighbours are read back with their distances. A candidate
//! is kept iff its truncated distance is strictly below the threshold.

use ragchat_config::RagConfig;

use crate::document::{RankedDocument, RetrievedDocument};
use crate::embeddings::Embedder;
use crate::memory_store::FlatL2Index;
use crate::RagError;

/// Reranker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reranker {
    top_k: usize,
    threshold: i64,
}

impl Default for Reranker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl Reranker {
    pub fn new(top_k: usize, threshold: i64) -> Self {
        Self { top_k, threshold }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.top_k, config.relevance_threshold)
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn is_retained(&self, assessed_score: i64) -> bool {
        assessed_score < self.threshold
    }

    /// Score the `top_k` nearest candidates, closest first
    ///
    /// Discarded candidates are included with `retained == false`. Equal
    /// distances keep candidate order.
    pub async fn score(
        &self,
        query: &str,
        candidates: &[RetrievedDocument],
        embedder: &dyn Embedder,
    ) -> Result<Vec<RankedDocument>, RagError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let excerpts: Vec<&str> = candidates.iter().map(|c| c.excerpt.as_str()).collect();
        let vectors = embedder.embed_batch(&excerpts).await?;
        if vectors.len() != candidates.len() {
            return Err(RagError::Embedding(format!(
                "embedded {} of {} candidates",
                vectors.len(),
                candidates.len()
            )));
        }

        let index = FlatL2Index::from_vectors(vectors)?;
        let query_vector = embedder.embed(query).await?;
        let neighbours = index.search(&query_vector, self.top_k)?;

        Ok(neighbours
            .into_iter()
            .filter_map(|(position, distance)| {
                let document = candidates.get(position)?;
                let assessed_score = distance as i64;
                tracing::debug!(
                    ordinal = document.ordinal,
                    backend = document.origin.backend_id(),
                    title = %document.title,
                    assessed_score,
                    "Candidate scored"
                );
                Some(RankedDocument {
                    document: document.clone(),
                    assessed_score,
                    retained: self.is_retained(assessed_score),
                })
            })
            .collect())
    }

    /// Kept candidates in rank order
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[RetrievedDocument],
        embedder: &dyn Embedder,
    ) -> Result<Vec<RankedDocument>, RagError> {
        let scored = self.score(query, candidates, embedder).await?;
        let kept: Vec<RankedDocument> = scored.into_iter().filter(|d| d.retained).collect();

        metrics::histogram!("ragchat_retained_documents").record(kept.len() as f64);
        tracing::debug!(
            candidates = candidates.len(),
            kept = kept.len(),
            "Rerank finished"
        );
        Ok(kept)
    }
}
