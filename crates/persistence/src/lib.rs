//! Persistence layer
//!
//! Provides storage for:
//! - Conversation log (ScyllaDB, or in-memory when persistence is disabled)
//! - Uploaded documents (filesystem, addressed by namespace and file name)

pub mod client;
pub mod documents;
pub mod error;
pub mod history;
pub mod schema;

pub use client::{ScyllaClient, ScyllaConfig};
pub use documents::FsDocumentStore;
pub use error::PersistenceError;
pub use history::{InMemoryHistoryStore, ScyllaHistoryStore};

use ragchat_config::PersistenceConfig;
use ragchat_core::{DocumentStore, HistoryStore};
use std::sync::Arc;

/// Stores handed to the request pipeline
#[derive(Clone)]
pub struct PersistenceLayer {
    pub history: Arc<dyn HistoryStore>,
    pub documents: Arc<dyn DocumentStore>,
}

/// Initialize the persistence layer
///
/// Connects to ScyllaDB and ensures the schema when persistence is enabled,
/// otherwise falls back to the in-memory conversation log.
pub async fn init(config: &PersistenceConfig) -> Result<PersistenceLayer, PersistenceError> {
    let history: Arc<dyn HistoryStore> = if config.enabled {
        let client = ScyllaClient::connect(ScyllaConfig::from(config)).await?;
        client.ensure_schema().await?;
        Arc::new(ScyllaHistoryStore::new(client))
    } else {
        tracing::info!("Persistence disabled, using in-memory conversation log");
        Arc::new(InMemoryHistoryStore::new())
    };

    Ok(PersistenceLayer {
        history,
        documents: Arc::new(FsDocumentStore::from_config(config)),
    })
}
