//! Durable alarm persistence and the recency lookup used for dedup.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use carewatch_core::{AlarmCategory, AlarmEvent, AlarmStatus, Severity};

use crate::error::StoreError;

/// Trait for alarm persistence backends.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Insert a new alarm event.
    async fn create(&self, alarm: &AlarmEvent) -> Result<(), StoreError>;

    /// Whether an *active* alarm of exactly this (tenant, entity, event type)
    /// was triggered within `window_minutes` before `now`.
    async fn has_recent(
        &self,
        tenant_id: &str,
        entity_id: &str,
        event_type: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Active alarms for an entity, most recent first.
    async fn list_active(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Vec<AlarmEvent>, StoreError>;
}

/// Start of the dedup window ending at `now`.
pub fn window_start(now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(window_minutes.max(0))
}

// ── PostgreSQL ───────────────────────────────────────────────────────

/// [`AlarmStore`] over the `alarm_events` table.
#[derive(Clone)]
pub struct PgAlarmStore {
    pool: PgPool,
}

impl PgAlarmStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AlarmRow {
    id: Uuid,
    tenant_id: String,
    entity_id: String,
    event_type: String,
    category: String,
    severity: String,
    status: String,
    triggered_at: DateTime<Utc>,
    handled_at: Option<DateTime<Utc>>,
    source_record_id: Option<String>,
    trigger_data: serde_json::Value,
    handler: Option<String>,
    operation: Option<String>,
    notes: Option<String>,
    notified_recipients: serde_json::Value,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlarmRow> for AlarmEvent {
    type Error = StoreError;

    fn try_from(row: AlarmRow) -> Result<Self, Self::Error> {
        let bad = |field: &str, value: &str| {
            StoreError::Serialization(format!("unknown {field} '{value}' on alarm {}", row.id))
        };
        let category =
            AlarmCategory::parse(&row.category).ok_or_else(|| bad("category", &row.category))?;
        let severity =
            Severity::parse(&row.severity).ok_or_else(|| bad("severity", &row.severity))?;
        let status = AlarmStatus::parse(&row.status).ok_or_else(|| bad("status", &row.status))?;
        let notified_recipients = serde_json::from_value(row.notified_recipients)?;

        Ok(AlarmEvent {
            id: row.id,
            tenant_id: row.tenant_id,
            entity_id: row.entity_id,
            event_type: row.event_type,
            category,
            severity,
            status,
            triggered_at: row.triggered_at,
            handled_at: row.handled_at,
            source_record_id: row.source_record_id,
            trigger_data: row.trigger_data,
            handler: row.handler,
            operation: row.operation,
            notes: row.notes,
            notified_recipients,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl AlarmStore for PgAlarmStore {
    async fn create(&self, alarm: &AlarmEvent) -> Result<(), StoreError> {
        let recipients = serde_json::to_value(&alarm.notified_recipients)?;
        sqlx::query(
            "INSERT INTO alarm_events (id, tenant_id, entity_id, event_type, category, severity,
                                       status, triggered_at, handled_at, source_record_id,
                                       trigger_data, handler, operation, notes,
                                       notified_recipients, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(alarm.id)
        .bind(&alarm.tenant_id)
        .bind(&alarm.entity_id)
        .bind(&alarm.event_type)
        .bind(alarm.category.as_str())
        .bind(alarm.severity.as_str())
        .bind(alarm.status.as_str())
        .bind(alarm.triggered_at)
        .bind(alarm.handled_at)
        .bind(&alarm.source_record_id)
        .bind(&alarm.trigger_data)
        .bind(&alarm.handler)
        .bind(&alarm.operation)
        .bind(&alarm.notes)
        .bind(recipients)
        .bind(&alarm.metadata)
        .bind(alarm.created_at)
        .bind(alarm.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                alarm_id = %alarm.id,
                entity_id = %alarm.entity_id,
                "alarm insert failed: {}",
                e
            );
            StoreError::Database(e)
        })?;

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
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM alarm_events
                 WHERE tenant_id = $1
                   AND entity_id = $2
                   AND event_type = $3
                   AND status = 'active'
                   AND triggered_at >= $4
             )",
        )
        .bind(tenant_id)
        .bind(entity_id)
        .bind(event_type)
        .bind(window_start(now, window_minutes))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_active(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Vec<AlarmEvent>, StoreError> {
        let rows = sqlx::query_as::<_, AlarmRow>(
            "SELECT id, tenant_id, entity_id, event_type, category, severity, status,
                    triggered_at, handled_at, source_record_id, trigger_data, handler,
                    operation, notes, notified_recipients, metadata, created_at, updated_at
             FROM alarm_events
             WHERE tenant_id = $1 AND entity_id = $2 AND status = 'active'
             ORDER BY triggered_at DESC",
        )
        .bind(tenant_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlarmEvent::try_from).collect()
    }
}
