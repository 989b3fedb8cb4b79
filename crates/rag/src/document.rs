//! Normalized retrieval results

use std::fmt;

use ragchat_config::{BackendKind, ConfidenceLevel};
use serde::{Deserialize, Serialize};

/// Kind of hit returned by the managed index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexHit {
    /// Passage from the retrieve API
    Retrieved,
    /// Question/answer pair from the query API
    Faq,
    /// Document excerpt or suggested answer from the query API
    Excerpt,
}

/// Backend family a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "backend", content = "hit")]
pub enum DocumentOrigin {
    ManagedIndex(IndexHit),
    Faiss,
    Opensearch,
}

impl DocumentOrigin {
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::ManagedIndex(_) => BackendKind::ManagedIndex,
            Self::Faiss => BackendKind::Faiss,
            Self::Opensearch => BackendKind::Opensearch,
        }
    }

    /// Identifier rendered in citations
    pub fn backend_id(&self) -> &'static str {
        self.backend().id()
    }
}

/// Backend-native confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Categorical label from the managed index
    Tier(ConfidenceLevel),
    /// Vector distance, lower is closer
    Distance(i64),
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Tier(level) => write!(f, "{}", level),
            Confidence::Distance(d) => write!(f, "{}", d),
        }
    }
}

/// A candidate document from one backend
///
/// Immutable once produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub origin: DocumentOrigin,
    pub title: String,
    pub excerpt: String,
    pub uri: String,
    pub page: Option<u32>,
    pub confidence: Confidence,
    /// Position within its backend's result list
    pub ordinal: usize,
    /// Distance reported by a vector backend, before reranking
    pub assessed_score: Option<i64>,
}

/// A candidate after reranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub document: RetrievedDocument,
    /// Embedding distance to the question, lower is more similar
    pub assessed_score: i64,
    pub retained: bool,
}

impl RankedDocument {
    pub fn backend_id(&self) -> &'static str {
        self.document.origin.backend_id()
    }
}

/// Join kept excerpts into the grounding context, each followed by a blank line
pub fn context_from(documents: &[RankedDocument]) -> String {
    documents
        .iter()
        .map(|d| format!("{}\n\n", d.document.excerpt))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(excerpt: &str) -> RankedDocument {
        RankedDocument {
            document: RetrievedDocument {
                origin: DocumentOrigin::Faiss,
                title: "t".to_string(),
                excerpt: excerpt.to_string(),
                uri: String::new(),
                page: None,
                confidence: Confidence::Distance(10),
                ordinal: 0,
                assessed_score: Some(10),
            },
            assessed_score: 10,
            retained: true,
        }
    }

    #[test]
    fn test_origin_backend_ids() {
        assert_eq!(DocumentOrigin::ManagedIndex(IndexHit::Faq).backend_id(), "kendra");
        assert_eq!(DocumentOrigin::Faiss.backend_id(), "faiss");
        assert_eq!(DocumentOrigin::Opensearch.backend(), BackendKind::Opensearch);
    }

    #[test]
    fn test_confidence_display() {
        assert_eq!(Confidence::Tier(ConfidenceLevel::VeryHigh).to_string(), "VERY_HIGH");
        assert_eq!(Confidence::Distance(42).to_string(), "42");
    }

    #[test]
    fn test_context_from() {
        assert_eq!(context_from(&[]), "");
        assert_eq!(context_from(&[doc("a"), doc("b")]), "a\n\nb\n\n");
    }
}
