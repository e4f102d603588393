//! Durable persistence for continuity state
//!
//! The engine talks to storage only through [`ContinuityStore`]: a handful
//! of key-value tables plus an append-only artifact log. Two backends ship
//! with the crate:
//!
//! - [`InMemoryStore`]: mutex-guarded maps, always available
//! - `RocksStore`: RocksDB with one column family per table
//!   (cargo feature `rocksdb-store`)
//!
//! Values are stored as JSON text so both backends share one encoding and
//! a host application can inspect rows directly.
//!
//! # Usage
//!
//! ```ignore
//! use continuity::store::{InMemoryStore, ContinuityStore, Table};
//!
//! let store = InMemoryStore::new();
//! store.upsert(Table::Settings, "safeguard", "{}".into()).await?;
//! ```

pub mod memory;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
pub mod schema;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::artifacts::{ArtifactKind, ContinuityArtifact};

pub use memory::InMemoryStore;
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksStore;
pub use schema::Table;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value tables plus the artifact log.
///
/// Upserts are insert-or-update on `key`, so repeating a write with the
/// same key is idempotent. Nothing here is transactional.
#[async_trait]
pub trait ContinuityStore: Send + Sync {
    /// Fetch the JSON value stored under `key`.
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<String>>;

    /// Insert or replace the JSON value stored under `key`.
    async fn upsert(&self, table: Table, key: &str, value: String) -> StoreResult<()>;

    /// Append an artifact row.
    async fn insert_artifact(&self, artifact: &ContinuityArtifact) -> StoreResult<()>;

    /// Most recent artifacts of a conversation, newest first, optionally
    /// restricted to one kind.
    async fn recent_artifacts(
        &self,
        conversation_id: &str,
        kind: Option<ArtifactKind>,
        limit: usize,
    ) -> StoreResult<Vec<ContinuityArtifact>>;
}

/// Typed read on top of [`ContinuityStore::get`].
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn ContinuityStore,
    table: Table,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(table, key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Deserialization(e.to_string())),
        None => Ok(None),
    }
}

/// Typed write on top of [`ContinuityStore::upsert`].
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn ContinuityStore,
    table: Table,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.upsert(table, key, raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        n: u32,
    }

    #[tokio::test]
    async fn test_json_helpers_roundtrip() {
        let store = InMemoryStore::new();
        put_json(&store, Table::Settings, "row", &Row { n: 3 })
            .await
            .unwrap();
        let row: Option<Row> = get_json(&store, Table::Settings, "row").await.unwrap();
        assert_eq!(row, Some(Row { n: 3 }));
    }

    #[tokio::test]
    async fn test_get_json_reports_corrupt_rows() {
        let store = InMemoryStore::new();
        store
            .upsert(Table::Settings, "row", "{not json".to_string())
            .await
            .unwrap();
        let result: StoreResult<Option<Row>> = get_json(&store, Table::Settings, "row").await;
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }
}
