use std::sync::Arc;

use carewatch_cache::{CacheGateway, KeyLayout, KvStore, StateStore};
use carewatch_core::config::EngineConfig;
use carewatch_storage::{AlarmStore, EntityCatalog};

use crate::state::RuleStateStore;

/// Everything one tenant's evaluation loop touches.
///
/// Tenants hosted in one process each get their own context; nothing in
/// here is shared mutable state between them.
#[derive(Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub gateway: CacheGateway,
    pub state: RuleStateStore,
    pub alarms: Arc<dyn AlarmStore>,
    pub catalog: Arc<dyn EntityCatalog>,
    pub engine: EngineConfig,
}

impl TenantContext {
    pub fn new(
        tenant_id: impl Into<String>,
        kv: Arc<dyn KvStore>,
        keys: KeyLayout,
        alarms: Arc<dyn AlarmStore>,
        catalog: Arc<dyn EntityCatalog>,
        engine: EngineConfig,
    ) -> Self {
        let gateway = CacheGateway::new(kv.clone(), keys.clone(), engine.alarm_cache_ttl());
        let state = RuleStateStore::new(StateStore::new(kv, keys));
        Self {
            tenant_id: tenant_id.into(),
            gateway,
            state,
            alarms,
            catalog,
            engine,
        }
    }
}
