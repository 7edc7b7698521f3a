//! Key-value store trait shared by the cache gateway and the state store.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Trait for TTL-aware key-value backends.
///
/// Values are opaque bytes; the store must hand back exactly what was
/// written. An expired key behaves exactly like an absent one.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a value, replacing any previous one. `None` keeps it until deleted.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Reset the time-to-live of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// List every live key starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Backend name for logs (e.g. "redis", "memory").
    fn backend_name(&self) -> &str;
}
