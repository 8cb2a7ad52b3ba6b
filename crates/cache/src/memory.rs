use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Result, store::CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    sliding_ttl: Option<Duration>,
    last_touched: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.sliding_ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.last_touched) >= ttl)
    }
}

/// Single-node cache store.
///
/// Expired entries are dropped lazily when read, or in bulk by
/// [`InMemoryCacheStore::purge_expired`]. Concurrent writers race with
/// last-writer-wins semantics. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCacheStore {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns true if a live entry exists, without refreshing its expiry.
    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Returns the stored keys in no particular order.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drops every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            metrics::counter!("cache_entries_expired_total").increment(purged as u64);
            tracing::debug!(purged, "purged expired cache entries");
        }
        purged
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => {
                entry.last_touched = now;
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }

        entries.remove(key);
        metrics::counter!("cache_entries_expired_total").increment(1);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, sliding_ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value,
            sliding_ttl,
            last_touched: Instant::now(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}
