//! In-memory continuity store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ContinuityStore, StoreError, StoreResult, Table};
use crate::artifacts::{ArtifactKind, ContinuityArtifact};

/// Mutex-guarded maps implementing [`ContinuityStore`].
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<Table, HashMap<String, String>>>,
    artifacts: Mutex<Vec<ContinuityArtifact>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: Table) -> usize {
        self.tables
            .lock()
            .map(|t| t.get(&table).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Number of stored artifacts across all conversations.
    pub fn artifact_count(&self) -> usize {
        self.artifacts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ContinuityStore for InMemoryStore {
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<String>> {
        let tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    async fn upsert(&self, table: Table, key: &str, value: String) -> StoreResult<()> {
        let mut tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        tables
            .entry(table)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn insert_artifact(&self, artifact: &ContinuityArtifact) -> StoreResult<()> {
        let mut artifacts = self.artifacts.lock().map_err(|_| StoreError::LockPoisoned)?;
        artifacts.push(artifact.clone());
        Ok(())
    }

    async fn recent_artifacts(
        &self,
        conversation_id: &str,
        kind: Option<ArtifactKind>,
        limit: usize,
    ) -> StoreResult<Vec<ContinuityArtifact>> {
        let artifacts = self.artifacts.lock().map_err(|_| StoreError::LockPoisoned)?;
        // Insertion order is chronological; walk it backwards for newest first.
        Ok(artifacts
            .iter()
            .rev()
            .filter(|a| a.conversation_id == conversation_id)
            .filter(|a| kind.map_or(true, |k| a.kind == k))
            .take(limit)
            .cloned()
            .collect())
    }
}
