//! Retrieval fan-out
//!
//! Sends one question to every enabled backend and merges the normalized
//! results. The merge order is always the order of the enabled-backend list,
//! then each backend's own rank order, whichever strategy ran the calls.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use ragchat_config::{BackendKind, FailurePolicy, FanoutStrategy, RagConfig};

use crate::document::RetrievedDocument;
use crate::normalizer::ResultNormalizer;
use crate::retriever::{RawHit, RetrievalBackend};
use crate::RagError;

/// Dispatches a question to several retrieval backends
pub struct RetrieverFanout {
    backends: Vec<Arc<dyn RetrievalBackend>>,
    strategy: FanoutStrategy,
    policy: FailurePolicy,
}

impl RetrieverFanout {
    pub fn new(
        backends: Vec<Arc<dyn RetrievalBackend>>,
        strategy: FanoutStrategy,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            backends,
            strategy,
            policy,
        }
    }

    pub fn from_config(backends: Vec<Arc<dyn RetrievalBackend>>, config: &RagConfig) -> Self {
        Self::new(backends, config.fanout, config.failure_policy)
    }

    /// Kinds of the registered backends
    pub fn available(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn strategy(&self) -> FanoutStrategy {
        self.strategy
    }

    fn select(&self, enabled: &[BackendKind]) -> Vec<Arc<dyn RetrievalBackend>> {
        enabled
            .iter()
            .filter_map(|kind| {
                let backend = self.backends.iter().find(|b| b.kind() == *kind);
                if backend.is_none() {
                    tracing::warn!(backend = %kind, "Enabled backend is not registered, skipping");
                }
                backend.cloned()
            })
            .collect()
    }

    /// Query every backend in `enabled`, in that order
    pub async fn fetch(
        &self,
        query: &str,
        top_k: usize,
        enabled: &[BackendKind],
    ) -> Result<Vec<RetrievedDocument>, RagError> {
        let selected = self.select(enabled);
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let per_backend = match self.strategy {
            FanoutStrategy::Sequential => self.fetch_sequential(&selected, query, top_k).await?,
            FanoutStrategy::Concurrent => self.fetch_concurrent(&selected, query, top_k).await?,
        };

        let mut documents = Vec::new();
        for (kind, hits) in per_backend {
            metrics::histogram!("ragchat_retrieval_documents", "backend" => kind.id())
                .record(hits.len() as f64);
            tracing::debug!(backend = %kind, count = hits.len(), "Backend results");
            documents.extend(ResultNormalizer::normalize(hits));
        }
        Ok(documents)
    }

    async fn fetch_sequential(
        &self,
        selected: &[Arc<dyn RetrievalBackend>],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(BackendKind, Vec<RawHit>)>, RagError> {
        let mut results = Vec::with_capacity(selected.len());
        let mut first_error = None;

        for backend in selected {
            let kind = backend.kind();
            match backend.search(query, top_k).await {
                Ok(hits) => results.push((kind, hits)),
                Err(e) => {
                    let err = RagError::backend(kind.id(), e);
                    match self.policy {
                        FailurePolicy::FailFast => return Err(err),
                        FailurePolicy::Partial => {
                            tracing::warn!(backend = %kind, error = %err, "Backend failed, continuing");
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(err) if results.is_empty() => Err(err),
            _ => Ok(results),
        }
    }

    async fn fetch_concurrent(
        &self,
        selected: &[Arc<dyn RetrievalBackend>],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(BackendKind, Vec<RawHit>)>, RagError> {
        let kinds: Vec<BackendKind> = selected.iter().map(|b| b.kind()).collect();

        let handles: Vec<_> = selected
            .iter()
            .map(|backend| {
                let backend = Arc::clone(backend);
                let query = query.to_string();
                tokio::spawn(async move {
                    let kind = backend.kind();
                    backend
                        .search(&query, top_k)
                        .await
                        .map_err(|e| RagError::backend(kind.id(), e))
                })
            })
            .collect();

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| async move { (i, handle.await) })
            .collect();

        let mut slots: Vec<Option<Vec<RawHit>>> = (0..kinds.len()).map(|_| None).collect();
        let mut first_error = None;

        while let Some((i, joined)) = pending.next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(RagError::Worker(format!("{} worker did not finish: {}", kinds[i], e)))
            });

            match outcome {
                Ok(hits) => slots[i] = Some(hits),
                Err(err) => match self.policy {
                    FailurePolicy::FailFast => {
                        for abort in &aborts {
                            abort.abort();
                        }
                        return Err(err);
                    }
                    FailurePolicy::Partial => {
                        tracing::warn!(backend = %kinds[i], error = %err, "Backend failed, continuing");
                        first_error.get_or_insert(err);
                    }
                },
            }
        }

        let results: Vec<_> = kinds
            .into_iter()
            .zip(slots)
            .filter_map(|(kind, hits)| hits.map(|h| (kind, h)))
            .collect();

        match first_error {
            Some(err) if results.is_empty() => Err(err),
            _ => Ok(results),
        }
    }
}
