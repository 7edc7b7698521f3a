//! Read-only listing of the entities a tenant monitors.

use async_trait::async_trait;
use sqlx::PgPool;

use carewatch_core::{DeviceBinding, DeviceType, EntityKind, MonitoredEntity};

use crate::error::StoreError;

/// Trait for entity catalog backends.
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// All entities of a tenant, with device bindings, in a stable order.
    async fn list_entities(&self, tenant_id: &str) -> Result<Vec<MonitoredEntity>, StoreError>;
}

/// [`EntityCatalog`] over `monitored_entities` + `device_bindings`.
#[derive(Clone)]
pub struct PgEntityCatalog {
    pool: PgPool,
}

impl PgEntityCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type CatalogRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[async_trait]
impl EntityCatalog for PgEntityCatalog {
    async fn list_entities(&self, tenant_id: &str) -> Result<Vec<MonitoredEntity>, StoreError> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            "SELECT e.id, e.tenant_id, e.name, e.kind,
                    b.device_id, b.device_type, b.location_name
             FROM monitored_entities e
             LEFT JOIN device_bindings b ON b.entity_id = e.id
             WHERE e.tenant_id = $1
             ORDER BY e.id, b.device_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(group_rows(rows))
    }
}

/// Fold joined rows (ordered by entity id) into entities with their bindings.
fn group_rows(rows: Vec<CatalogRow>) -> Vec<MonitoredEntity> {
    let mut entities: Vec<MonitoredEntity> = Vec::new();

    for (id, tenant_id, name, kind, device_id, device_type, location_name) in rows {
        let same = entities.last().map_or(false, |e| e.id == id);
        if !same {
            entities.push(MonitoredEntity {
                id,
                tenant_id,
                name,
                kind: EntityKind::parse(&kind),
                bindings: Vec::new(),
            });
        }

        if let (Some(device_id), Some(entity)) = (device_id, entities.last_mut()) {
            entity.bindings.push(DeviceBinding {
                device_id,
                device_type: device_type
                    .as_deref()
                    .map(DeviceType::parse)
                    .unwrap_or(DeviceType::Other),
                location_name,
            });
        }
    }

    entities
}
