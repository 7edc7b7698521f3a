//! In-process store backends for tests and local runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use carewatch_core::{AlarmEvent, MonitoredEntity};

use crate::alarm_store::{window_start, AlarmStore};
use crate::catalog::EntityCatalog;
use crate::error::StoreError;

/// [`AlarmStore`] keeping alarms in insertion order.
#[derive(Default)]
pub struct MemoryAlarmStore {
    alarms: Mutex<Vec<AlarmEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create` calls fail (simulates an unavailable store).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every stored alarm.
    pub fn all(&self) -> Vec<AlarmEvent> {
        self.alarms.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.alarms.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AlarmEvent>>, StoreError> {
        self.alarms
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("alarm store lock poisoned: {e}")))
    }
}

#[async_trait]
impl AlarmStore for MemoryAlarmStore {
    async fn create(&self, alarm: &AlarmEvent) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        self.lock()?.push(alarm.clone());
        Ok(())
    }

    async fn has_recent(
        &self,
        tenant_id: &str,
        entity_id: &str,
        event_type: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let since = window_start(now, window_minutes);
        Ok(self.lock()?.iter().any(|a| {
            a.tenant_id == tenant_id
                && a.entity_id == entity_id
                && a.event_type == event_type
                && a.is_active()
                && a.triggered_at >= since
        }))
    }

    async fn list_active(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Vec<AlarmEvent>, StoreError> {
        let mut out: Vec<AlarmEvent> = self
            .lock()?
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.entity_id == entity_id && a.is_active())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(out)
    }
}

/// [`EntityCatalog`] over a fixed list of entities.
#[derive(Default)]
pub struct StaticCatalog {
    entities: Mutex<Vec<MonitoredEntity>>,
    fail: AtomicBool,
}

impl StaticCatalog {
    pub fn new(entities: Vec<MonitoredEntity>) -> Self {
        Self {
            entities: Mutex::new(entities),
            fail: AtomicBool::new(false),
        }
    }

    /// Make subsequent listings fail (simulates an unreachable catalog).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityCatalog for StaticCatalog {
    async fn list_entities(&self, tenant_id: &str) -> Result<Vec<MonitoredEntity>, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("catalog offline".to_string()));
        }
        let guard = self
            .entities
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("catalog lock poisoned: {e}")))?;
        Ok(guard
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
