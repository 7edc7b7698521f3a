//! TTL-bounded rule state blobs.
//!
//! The store never looks inside a value; each rule owns its schema. Every
//! record is addressed by a [`StateKey`] (entity, track, rule), so rules
//! cannot reach each other's namespaces through this API.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::CacheError;
use crate::keys::{KeyLayout, StateKey};
use crate::kv::KvStore;

#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
    keys: KeyLayout,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>, keys: KeyLayout) -> Self {
        Self { kv, keys }
    }

    pub async fn set_state(
        &self,
        key: &StateKey,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.kv.set(&self.keys.state_key(key), value, Some(ttl)).await
    }

    /// Fails with [`CacheError::NotFound`] when absent or expired.
    pub async fn get_state(&self, key: &StateKey) -> Result<Vec<u8>, CacheError> {
        let full = self.keys.state_key(key);
        match self.kv.get(&full).await? {
            Some(bytes) => Ok(bytes),
            None => {
                debug!(key = %full, "no rule state");
                Err(CacheError::NotFound(full))
            }
        }
    }

    pub async fn exists(&self, key: &StateKey) -> Result<bool, CacheError> {
        self.kv.exists(&self.keys.state_key(key)).await
    }

    pub async fn delete(&self, key: &StateKey) -> Result<(), CacheError> {
        self.kv.delete(&self.keys.state_key(key)).await
    }

    /// Refresh the TTL of an in-progress record. Returns `false` if it already expired.
    pub async fn extend_ttl(&self, key: &StateKey, ttl: Duration) -> Result<bool, CacheError> {
        self.kv.expire(&self.keys.state_key(key), ttl).await
    }
}
