use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Key/value store with per-key sliding expiry.
///
/// Values are opaque bytes. Implementations may be single-node or shared
/// between processes; `delete_by_prefix` may be a scan.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value under `key`, refreshing its sliding expiry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// With `sliding_ttl` set, the entry expires once it has gone unread
    /// for that long. Without it, the entry never expires.
    async fn set(&self, key: &str, value: Vec<u8>, sliding_ttl: Option<Duration>) -> Result<()>;

    /// Removes `key`. Returns false if nothing was stored under it.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every entry whose key starts with `prefix`. Returns the count.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize>;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, sliding_ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, sliding_ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        (**self).delete_by_prefix(prefix).await
    }
}
