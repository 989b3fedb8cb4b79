//! Conversation log stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ragchat_core::{HistoryEntry, HistoryStore, InteractionType};
use std::collections::HashMap;

use crate::{PersistenceError, ScyllaClient};

/// ScyllaDB-backed conversation log
#[derive(Clone)]
pub struct ScyllaHistoryStore {
    client: ScyllaClient,
}

impl ScyllaHistoryStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn insert(&self, entry: &HistoryEntry) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.chat_log (user_id, request_time, request_id, type, body, msg)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &entry.user_id,
                    entry.request_time.timestamp_millis(),
                    &entry.request_id,
                    entry.kind.as_str(),
                    &entry.body,
                    &entry.msg,
                ),
            )
            .await?;

        tracing::debug!(
            user_id = %entry.user_id,
            request_id = %entry.request_id,
            "History entry written"
        );
        Ok(())
    }

    async fn select_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, PersistenceError> {
        let query = format!(
            "SELECT user_id, request_time, request_id, type, body, msg
             FROM {}.chat_log WHERE user_id = ? AND request_time > ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, since.timestamp_millis()))
            .await?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                entries.push(row_to_entry(row)?);
            }
        }
        Ok(entries)
    }
}

fn row_to_entry(row: scylla::frame::response::result::Row) -> Result<HistoryEntry, PersistenceError> {
    let (user_id, request_time, request_id, kind, body, msg): (
        String,
        i64,
        String,
        String,
        Option<String>,
        Option<String>,
    ) = row
        .into_typed()
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    let request_time = DateTime::from_timestamp_millis(request_time).ok_or_else(|| {
        PersistenceError::InvalidData(format!("request_time out of range: {}", request_time))
    })?;
    let kind = kind
        .parse::<InteractionType>()
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    Ok(HistoryEntry {
        user_id,
        request_id,
        request_time,
        kind,
        body: body.unwrap_or_default(),
        msg: msg.unwrap_or_default(),
    })
}

#[async_trait]
impl HistoryStore for ScyllaHistoryStore {
    async fn load_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> ragchat_core::Result<Vec<HistoryEntry>> {
        Ok(self.select_since(user_id, since).await?)
    }

    async fn append(&self, entry: HistoryEntry) -> ragchat_core::Result<()> {
        Ok(self.insert(&entry).await?)
    }

    fn name(&self) -> &str {
        "scylla"
    }
}

/// Process-local conversation log
///
/// Entries are kept per user in request-time order; used when persistence
/// is disabled and in tests.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<HashMap<String, Vec<HistoryEntry>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry stored for `user_id`, oldest first
    pub fn entries_for(&self, user_id: &str) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> ragchat_core::Result<Vec<HistoryEntry>> {
        Ok(self
            .entries
            .read()
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.request_time > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append(&self, entry: HistoryEntry) -> ragchat_core::Result<()> {
        let mut entries = self.entries.write();
        let log = entries.entry(entry.user_id.clone()).or_default();
        // stable for equal stamps: a new entry goes after existing ones
        let position = log.partition_point(|e| e.request_time <= entry.request_time);
        log.insert(position, entry);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
