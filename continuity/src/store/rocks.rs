//! RocksDB-backed continuity store
//!
//! One column family per table plus `artifacts`. Artifact keys embed the
//! creation time so a prefix scan over a conversation returns rows in
//! chronological order.

use std::path::PathBuf;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};

use super::schema::{self, ALL_CFS};
use super::{ContinuityStore, StoreError, StoreResult, Table};
use crate::artifacts::{ArtifactKind, ContinuityArtifact};

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// RocksDB-backed persistent store
pub struct RocksStore {
    db: DB,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self { db, path })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn put_raw(&self, cf_name: &str, key: &str, value: &[u8]) -> StoreResult<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        Ok(())
    }

    fn get_raw(&self, cf_name: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    /// Values under `prefix`, newest key first, until `keep` has accepted
    /// `limit` of them.
    fn scan_prefix_rev<T>(
        &self,
        cf_name: &str,
        prefix: &str,
        limit: usize,
        mut keep: impl FnMut(&[u8]) -> Option<T>,
    ) -> StoreResult<Vec<T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }
        let upper = prefix_upper_bound(prefix.as_bytes());
        let mode = match &upper {
            Some(bound) => IteratorMode::From(bound.as_slice(), Direction::Reverse),
            None => IteratorMode::End,
        };

        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                // The seek may land exactly on the bound key.
                if upper.as_deref() == Some(&key[..]) {
                    continue;
                }
                break;
            }
            if let Some(row) = keep(&value[..]) {
                out.push(row);
                if out.len() >= limit {
                    break;
                }
            }
        }

        Ok(out)
    }
}

/// Smallest key greater than every key starting with `prefix`.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

#[async_trait]
impl ContinuityStore for RocksStore {
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<String>> {
        match self.get_raw(table.column_family(), key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn upsert(&self, table: Table, key: &str, value: String) -> StoreResult<()> {
        self.put_raw(table.column_family(), key, value.as_bytes())
    }

    async fn insert_artifact(&self, artifact: &ContinuityArtifact) -> StoreResult<()> {
        let key = schema::keys::artifact(
            &artifact.conversation_id,
            artifact.created_at.timestamp_millis(),
            &artifact.id.to_string(),
        );
        let bytes =
            serde_json::to_vec(artifact).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_raw(schema::CF_ARTIFACTS, &key, &bytes)
    }

    async fn recent_artifacts(
        &self,
        conversation_id: &str,
        kind: Option<ArtifactKind>,
        limit: usize,
    ) -> StoreResult<Vec<ContinuityArtifact>> {
        let prefix = schema::keys::artifact_prefix(conversation_id);
        self.scan_prefix_rev(schema::CF_ARTIFACTS, &prefix, limit, |bytes| {
            serde_json::from_slice::<ContinuityArtifact>(bytes)
                .ok()
                .filter(|a| a.conversation_id == conversation_id)
                .filter(|a| kind.map_or(true, |k| a.kind == k))
        })
    }
}
