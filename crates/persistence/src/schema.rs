//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Conversation log, one row per completed request
///
/// Partitioned by user so a session hydration is a single-partition range
/// scan on `request_time` (epoch millis).
pub fn chat_log_table(keyspace: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.chat_log (
            user_id TEXT,
            request_time BIGINT,
            request_id TEXT,
            type TEXT,
            body TEXT,
            msg TEXT,
            PRIMARY KEY ((user_id), request_time, request_id)
        ) WITH CLUSTERING ORDER BY (request_time ASC, request_id ASC)
    "#,
        keyspace
    )
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    session
        .query_unpaged(chat_log_table(keyspace), &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create chat_log table: {}", e)))?;

    tracing::info!("All tables created successfully");
    Ok(())
}
