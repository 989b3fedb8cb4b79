//! Backend-native hits to [`RetrievedDocument`]

use crate::document::{Confidence, DocumentOrigin, IndexHit, RetrievedDocument};
use crate::managed_index::{IndexApi, IndexItem, QueryResultType};
use crate::retriever::{RawHit, VectorHit};

/// Maps every backend family onto the shared document schema
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultNormalizer;

impl ResultNormalizer {
    /// Normalize one backend's hits, keeping their order
    pub fn normalize(hits: Vec<RawHit>) -> Vec<RetrievedDocument> {
        hits.into_iter()
            .enumerate()
            .map(|(ordinal, hit)| Self::normalize_hit(hit, ordinal))
            .collect()
    }

    pub fn normalize_hit(hit: RawHit, ordinal: usize) -> RetrievedDocument {
        match hit {
            RawHit::ManagedIndex(item) => Self::from_index_item(item, ordinal),
            RawHit::Faiss(hit) => Self::from_vector_hit(DocumentOrigin::Faiss, hit, ordinal),
            RawHit::Opensearch(hit) => {
                Self::from_vector_hit(DocumentOrigin::Opensearch, hit, ordinal)
            }
        }
    }

    fn from_index_item(item: IndexItem, ordinal: usize) -> RetrievedDocument {
        let kind = match (item.api, item.result_type) {
            (IndexApi::Retrieve, _) => IndexHit::Retrieved,
            (IndexApi::Query, QueryResultType::QuestionAnswer) => IndexHit::Faq,
            (IndexApi::Query, QueryResultType::Document | QueryResultType::Answer) => {
                IndexHit::Excerpt
            }
        };

        let excerpt = match (kind, item.question) {
            (IndexHit::Faq, Some(question)) => {
                format!("{} {}", question, item.excerpt).replace('\n', " ")
            }
            (IndexHit::Faq, None) => item.excerpt.replace('\n', " "),
            _ => item.excerpt,
        };

        RetrievedDocument {
            origin: DocumentOrigin::ManagedIndex(kind),
            title: item.title,
            excerpt,
            uri: item.uri,
            page: item.page,
            confidence: Confidence::Tier(item.confidence),
            ordinal,
            assessed_score: None,
        }
    }

    fn from_vector_hit(origin: DocumentOrigin, hit: VectorHit, ordinal: usize) -> RetrievedDocument {
        let distance = hit.distance as i64;
        RetrievedDocument {
            origin,
            title: hit.name,
            excerpt: hit.excerpt,
            uri: hit.uri.unwrap_or_default(),
            page: hit.page,
            confidence: Confidence::Distance(distance),
            ordinal,
            assessed_score: Some(distance),
        }
    }
}
