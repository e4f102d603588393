//! Two-tier cache: an in-process hot map in front of a durable table.
//!
//! Reads check the hot map, then the durable table (promoting hits), and
//! honor the same TTL in both tiers. Writes go to both. Durable failures
//! degrade to a miss or a skipped write; the hot tier keeps serving.
//!
//! Keys are derived from content or repository state, so entries are never
//! invalidated in place. A change in any input produces a new key.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::error::try_persist;
use crate::store::{get_json, put_json, ContinuityStore, Table};

/// Freshness rule for cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Entries never expire.
    Forever,
    /// Entries older than this are misses.
    MaxAge(Duration),
}

impl TtlPolicy {
    fn is_fresh(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Forever => true,
            Self::MaxAge(max) => {
                let age = now.signed_duration_since(stored_at);
                age.to_std().map_or(true, |age| age < *max)
            }
        }
    }
}

/// A value plus the time it was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
}

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hot,
    Durable,
}

/// Hot map + durable table with a shared TTL policy.
pub struct CacheTier<V> {
    name: &'static str,
    table: Table,
    ttl: TtlPolicy,
    hot: Mutex<HashMap<String, CachedEntry<V>>>,
    store: Arc<dyn ContinuityStore>,
}

impl<V> CacheTier<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        name: &'static str,
        table: Table,
        ttl: TtlPolicy,
        store: Arc<dyn ContinuityStore>,
    ) -> Self {
        Self {
            name,
            table,
            ttl,
            hot: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Look up `key`, returning the value and the tier that served it.
    pub async fn get(&self, key: &str) -> Option<(V, CacheSource)> {
        self.get_at(key, Utc::now()).await
    }

    /// Store `value` under `key` in both tiers, stamped now.
    pub async fn put(&self, key: &str, value: V) {
        self.put_at(key, value, Utc::now()).await;
    }

    pub(crate) async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<(V, CacheSource)> {
        if let Some(entry) = self.hot_get(key) {
            if self.ttl.is_fresh(entry.stored_at, now) {
                debug!(cache = self.name, "hot cache hit");
                return Some((entry.value, CacheSource::Hot));
            }
        }

        let durable: Option<CachedEntry<V>> = try_persist(
            "cache.get",
            get_json(self.store.as_ref(), self.table, key),
        )
        .await
        .flatten();

        match durable {
            Some(entry) if self.ttl.is_fresh(entry.stored_at, now) => {
                debug!(cache = self.name, "durable cache hit");
                self.hot_insert(key, entry.clone());
                Some((entry.value, CacheSource::Durable))
            }
            _ => None,
        }
    }

    pub(crate) async fn put_at(&self, key: &str, value: V, now: DateTime<Utc>) {
        let entry = CachedEntry {
            value,
            stored_at: now,
        };
        self.hot_insert(key, entry.clone());
        let _ = try_persist(
            "cache.put",
            put_json(self.store.as_ref(), self.table, key, &entry),
        )
        .await;
    }

    /// Number of entries held in the hot tier.
    pub fn hot_len(&self) -> usize {
        self.hot.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn hot_get(&self, key: &str) -> Option<CachedEntry<V>> {
        // A poisoned map is only a lost cache; keep using it.
        let hot = self.hot.lock().unwrap_or_else(|e| e.into_inner());
        hot.get(key).cloned()
    }

    fn hot_insert(&self, key: &str, entry: CachedEntry<V>) {
        let mut hot = self.hot.lock().unwrap_or_else(|e| e.into_inner());
        hot.insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactKind, ContinuityArtifact};
    use crate::store::{InMemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl ContinuityStore for BrokenStore {
        async fn get(&self, _table: Table, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn upsert(&self, _table: Table, _key: &str, _value: String) -> StoreResult<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn insert_artifact(&self, _artifact: &ContinuityArtifact) -> StoreResult<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn recent_artifacts(
            &self,
            _conversation_id: &str,
            _kind: Option<ArtifactKind>,
            _limit: usize,
        ) -> StoreResult<Vec<ContinuityArtifact>> {
            Err(StoreError::Backend("disk on fire".into()))
        }
    }

    fn tier(store: Arc<dyn ContinuityStore>, ttl: TtlPolicy) -> CacheTier<String> {
        CacheTier::new("test", Table::SearchCache, ttl, store)
    }

    #[tokio::test]
    async fn test_put_then_get_hits_hot() {
        let cache = tier(Arc::new(InMemoryStore::new()), TtlPolicy::Forever);
        cache.put("k", "v".to_string()).await;
        assert_eq!(
            cache.get("k").await,
            Some(("v".to_string(), CacheSource::Hot))
        );
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let store: Arc<dyn ContinuityStore> = Arc::new(InMemoryStore::new());
        let writer = tier(store.clone(), TtlPolicy::Forever);
        writer.put("k", "v".to_string()).await;

        // Fresh process: empty hot tier, same durable store.
        let reader = tier(store, TtlPolicy::Forever);
        assert_eq!(reader.hot_len(), 0);
        assert_eq!(
            reader.get("k").await,
            Some(("v".to_string(), CacheSource::Durable))
        );
        assert_eq!(reader.hot_len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expires_in_both_tiers() {
        let store: Arc<dyn ContinuityStore> = Arc::new(InMemoryStore::new());
        let cache = tier(store, TtlPolicy::MaxAge(Duration::from_secs(60)));
        let t0 = Utc::now();
        cache.put_at("k", "v".to_string(), t0).await;

        let fresh = t0 + chrono::Duration::seconds(59);
        assert!(cache.get_at("k", fresh).await.is_some());

        let stale = t0 + chrono::Duration::seconds(61);
        assert!(cache.get_at("k", stale).await.is_none());
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_hot_only() {
        let cache = tier(Arc::new(BrokenStore), TtlPolicy::Forever);
        assert!(cache.get("missing").await.is_none());
        cache.put("k", "v".to_string()).await;
        assert_eq!(
            cache.get("k").await,
            Some(("v".to_string(), CacheSource::Hot))
        );
    }
}
