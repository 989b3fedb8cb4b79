//! Managed document index backend
//!
//! The index exposes two APIs. `retrieve` returns semantically ranked
//! passages; `query` returns typed results (documents, suggested answers and
//! FAQ question/answer pairs) with a categorical confidence.
//!
//! Search policy:
//! 1. `retrieve` with page size `top_k` and the language attribute filter.
//! 2. If that returned anything, look up FAQ answers with `query` (page size
//!    `faq_page_size`, question/answer results only), keep the ones in the
//!    FAQ tier set, then top up with the retrieved passages until `top_k`.
//! 3. Otherwise fall back to an unrestricted `query` with page size `top_k`,
//!    keeping results in the fallback tier set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragchat_config::{BackendKind, ConfidenceLevel, ManagedIndexConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::retriever::{RawHit, RetrievalBackend};
use crate::RagError;

const SOURCE_URI_ATTRIBUTE: &str = "_source_uri";
const PAGE_NUMBER_ATTRIBUTE: &str = "_excerpt_page_number";
const LANGUAGE_ATTRIBUTE: &str = "_language_code";

/// Which index API produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexApi {
    Retrieve,
    Query,
}

/// Result type reported by the query API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResultType {
    Document,
    QuestionAnswer,
    Answer,
}

/// Equality filter on a document attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeFilter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveRequest {
    pub query_text: String,
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_filter: Option<AttributeFilter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query_text: String,
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type_filter: Option<QueryResultType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_filter: Option<AttributeFilter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentAttribute {
    pub key: String,
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub long_value: Option<i64>,
}

fn default_confidence() -> ConfidenceLevel {
    ConfidenceLevel::NotAvailable
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveResultItem {
    pub document_id: String,
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub document_uri: String,
    pub content: String,
    #[serde(default = "default_confidence")]
    pub score_confidence: ConfidenceLevel,
    #[serde(default)]
    pub document_attributes: Vec<DocumentAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub query_id: String,
    #[serde(default)]
    pub result_items: Vec<RetrieveResultItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResultItem {
    #[serde(rename = "type")]
    pub result_type: QueryResultType,
    pub document_id: String,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub document_uri: String,
    #[serde(default)]
    pub document_excerpt: String,
    /// Question text of a FAQ entry
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default = "default_confidence")]
    pub score_confidence: ConfidenceLevel,
    #[serde(default)]
    pub document_attributes: Vec<DocumentAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query_id: String,
    #[serde(default)]
    pub result_items: Vec<QueryResultItem>,
}

/// Index service client
#[async_trait]
pub trait ManagedIndexApi: Send + Sync {
    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RagError>;

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, RagError>;
}

/// A managed index result, flattened from either API
#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    pub api: IndexApi,
    pub result_type: QueryResultType,
    pub confidence: ConfidenceLevel,
    pub document_id: String,
    pub title: String,
    pub uri: String,
    pub page: Option<u32>,
    /// Question text, FAQ results only
    pub question: Option<String>,
    /// Passage text, or the answer of a FAQ result
    pub excerpt: String,
}

fn attribute<'a>(attributes: &'a [DocumentAttribute], key: &str) -> Option<&'a DocumentAttribute> {
    attributes.iter().find(|a| a.key == key)
}

impl From<RetrieveResultItem> for IndexItem {
    fn from(item: RetrieveResultItem) -> Self {
        let uri = attribute(&item.document_attributes, SOURCE_URI_ATTRIBUTE)
            .and_then(|a| a.string_value.clone())
            .filter(|uri| !uri.is_empty())
            .unwrap_or(item.document_uri);

        Self {
            api: IndexApi::Retrieve,
            result_type: QueryResultType::Document,
            confidence: item.score_confidence,
            document_id: item.document_id,
            title: item.document_title,
            uri,
            page: None,
            question: None,
            excerpt: item.content,
        }
    }
}

impl From<QueryResultItem> for IndexItem {
    fn from(item: QueryResultItem) -> Self {
        let page = attribute(&item.document_attributes, PAGE_NUMBER_ATTRIBUTE)
            .and_then(|a| a.long_value)
            .and_then(|p| u32::try_from(p).ok());

        Self {
            api: IndexApi::Query,
            result_type: item.result_type,
            confidence: item.score_confidence,
            document_id: item.document_id,
            title: item.document_title.unwrap_or_default(),
            uri: item.document_uri,
            page,
            question: item.question_text,
            excerpt: item.document_excerpt,
        }
    }
}

/// Search policy knobs
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPolicy {
    /// Language attribute filter value; empty disables the filter
    pub language_code: String,
    pub faq_page_size: usize,
    pub faq_tiers: Vec<ConfidenceLevel>,
    pub fallback_tiers: Vec<ConfidenceLevel>,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self::from(&ManagedIndexConfig::default())
    }
}

impl From<&ManagedIndexConfig> for IndexPolicy {
    fn from(config: &ManagedIndexConfig) -> Self {
        Self {
            language_code: config.language_code.clone(),
            faq_page_size: config.faq_page_size,
            faq_tiers: config.faq_tiers.clone(),
            fallback_tiers: config.fallback_tiers.clone(),
        }
    }
}

impl IndexPolicy {
    fn language_filter(&self) -> Option<AttributeFilter> {
        if self.language_code.is_empty() {
            None
        } else {
            Some(AttributeFilter {
                key: LANGUAGE_ATTRIBUTE.to_string(),
                value: self.language_code.clone(),
            })
        }
    }
}

/// Managed index as a retrieval backend
pub struct ManagedIndexRetriever {
    api: Arc<dyn ManagedIndexApi>,
    policy: IndexPolicy,
}

impl ManagedIndexRetriever {
    pub fn new(api: Arc<dyn ManagedIndexApi>, policy: IndexPolicy) -> Self {
        Self { api, policy }
    }

    /// Run the retrieve → FAQ → fallback policy
    pub async fn search_items(&self, query: &str, top_k: usize) -> Result<Vec<IndexItem>, RagError> {
        let retrieved = self
            .api
            .retrieve(&RetrieveRequest {
                query_text: query.to_string(),
                page_size: top_k,
                attribute_filter: self.policy.language_filter(),
            })
            .await?;

        tracing::debug!(
            query_id = %retrieved.query_id,
            count = retrieved.result_items.len(),
            "Managed index retrieve"
        );

        if retrieved.result_items.is_empty() {
            return self.fallback_query(query, top_k).await;
        }

        let faq = self
            .api
            .query(&QueryRequest {
                query_text: query.to_string(),
                page_size: self.policy.faq_page_size,
                result_type_filter: Some(QueryResultType::QuestionAnswer),
                attribute_filter: self.policy.language_filter(),
            })
            .await?;

        let mut items: Vec<IndexItem> = Vec::with_capacity(top_k);
        for result in faq.result_items {
            if items.len() >= top_k {
                break;
            }
            if self.policy.faq_tiers.contains(&result.score_confidence) {
                items.push(result.into());
            }
        }

        for result in retrieved.result_items {
            if items.len() >= top_k {
                break;
            }
            items.push(result.into());
        }

        Ok(items)
    }

    async fn fallback_query(&self, query: &str, top_k: usize) -> Result<Vec<IndexItem>, RagError> {
        tracing::debug!("No retrieve results, falling back to query API");

        let response = self
            .api
            .query(&QueryRequest {
                query_text: query.to_string(),
                page_size: top_k,
                result_type_filter: None,
                attribute_filter: self.policy.language_filter(),
            })
            .await?;

        Ok(response
            .result_items
            .into_iter()
            .filter(|r| self.policy.fallback_tiers.contains(&r.score_confidence))
            .take(top_k)
            .map(IndexItem::from)
            .collect())
    }
}

#[async_trait]
impl RetrievalBackend for ManagedIndexRetriever {
    fn kind(&self) -> BackendKind {
        BackendKind::ManagedIndex
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawHit>, RagError> {
        Ok(self
            .search_items(query, top_k)
            .await?
            .into_iter()
            .map(RawHit::ManagedIndex)
            .collect())
    }
}

/// JSON-over-HTTP index client
///
/// Calls `POST {endpoint}/indexes/{index_id}/retrieve` and `.../query`.
pub struct HttpManagedIndex {
    client: Client,
    endpoint: String,
    index_id: String,
    api_key: Option<String>,
}

impl HttpManagedIndex {
    pub fn new(config: &ManagedIndexConfig) -> Result<Self, RagError> {
        if config.index_id.is_empty() {
            return Err(RagError::Index("managed index id is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index_id: config.index_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/indexes/{}/{}", self.endpoint, self.index_id, operation)
    }

    async fn post<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, RagError>
    where
        Req: Serialize + Sync,
        Resp: serde::de::DeserializeOwned + Send,
    {
        let mut builder = self.client.post(self.url(operation)).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Search(format!("{} {}: {}", operation, status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| RagError::Search(format!("invalid {} response: {}", operation, e)))
    }
}

#[async_trait]
impl ManagedIndexApi for HttpManagedIndex {
    async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RagError> {
        self.post("retrieve", request).await
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, RagError> {
        self.post("query", request).await
    }
}
