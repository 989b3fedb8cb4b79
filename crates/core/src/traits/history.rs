//! Durable conversation history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::InteractionType;
use crate::Result;

/// One completed request as stored in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub request_id: String,
    pub request_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    /// What the user sent
    pub body: String,
    /// Final answer with the citation block appended
    pub msg: String,
}

/// Conversation log
///
/// Implementations:
/// - `ScyllaHistoryStore` - ScyllaDB table keyed by user and request time
/// - `InMemoryHistoryStore` - process-local store for development and tests
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Entries for `user_id` strictly newer than `since`, oldest first
    async fn load_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<HistoryEntry>>;

    /// Record one completed request
    async fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}
