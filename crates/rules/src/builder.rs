//! Turns a rule's [`RaisedAlarm`] into the canonical [`AlarmEvent`] record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use carewatch_core::{AlarmEvent, AlarmStatus};

use crate::rule::RaisedAlarm;

#[derive(Debug, Clone)]
pub struct AlarmBuilder {
    tenant_id: String,
}

impl AlarmBuilder {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }

    /// Fresh id, status `active`, no recipients, every timestamp set to `now`.
    pub fn build(
        &self,
        entity_id: &str,
        raised: RaisedAlarm,
        now: DateTime<Utc>,
    ) -> Result<AlarmEvent, serde_json::Error> {
        Ok(AlarmEvent {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id.clone(),
            entity_id: entity_id.to_string(),
            event_type: raised.event_type.to_string(),
            category: raised.category,
            severity: raised.severity,
            status: AlarmStatus::Active,
            triggered_at: now,
            handled_at: None,
            source_record_id: None,
            trigger_data: serde_json::to_value(&raised.snapshot)?,
            handler: None,
            operation: None,
            notes: None,
            notified_recipients: Vec::new(),
            metadata: raised.metadata,
            created_at: now,
            updated_at: now,
        })
    }
}
