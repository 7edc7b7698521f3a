//! Typed access to fused readings and the active-alarm mirror.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use carewatch_core::{AlarmEvent, Reading};

use crate::error::CacheError;
use crate::keys::KeyLayout;
use crate::kv::KvStore;

/// Default lifetime of the active-alarm mirror.
pub const DEFAULT_ALARM_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct CacheGateway {
    kv: Arc<dyn KvStore>,
    keys: KeyLayout,
    alarm_ttl: Duration,
}

impl CacheGateway {
    pub fn new(kv: Arc<dyn KvStore>, keys: KeyLayout, alarm_ttl: Duration) -> Self {
        Self { kv, keys, alarm_ttl }
    }

    /// Latest fused reading for an entity.
    ///
    /// Fails with [`CacheError::NotFound`] when nothing is cached (or it expired).
    pub async fn get_reading(&self, entity_id: &str) -> Result<Reading, CacheError> {
        let key = self.keys.reading_key(entity_id);
        match self.kv.get(&key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                debug!(entity_id, key = %key, "no cached reading");
                Err(CacheError::NotFound(key))
            }
        }
    }

    /// Write a reading the way the fusion process does. Used by replay tools and tests.
    pub async fn put_reading(
        &self,
        entity_id: &str,
        reading: &Reading,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(reading)?;
        self.kv.set(&self.keys.reading_key(entity_id), &bytes, ttl).await
    }

    /// Overwrite the active-alarm mirror for an entity with a short TTL.
    pub async fn put_active_alarms(
        &self,
        entity_id: &str,
        alarms: &[AlarmEvent],
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(alarms)?;
        self.kv
            .set(&self.keys.alarm_key(entity_id), &bytes, Some(self.alarm_ttl))
            .await
    }

    /// Read back the mirror. An absent mirror is an empty list.
    pub async fn get_active_alarms(&self, entity_id: &str) -> Result<Vec<AlarmEvent>, CacheError> {
        match self.kv.get(&self.keys.alarm_key(entity_id)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Enumerate entity ids that currently have a cached reading.
    ///
    /// Degraded-mode alternative to the entity catalog.
    pub async fn scan_entity_ids(&self) -> Result<Vec<String>, CacheError> {
        let keys = self.kv.scan_prefix(self.keys.reading_prefix()).await?;
        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|k| self.keys.entity_id_from_reading_key(k))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
