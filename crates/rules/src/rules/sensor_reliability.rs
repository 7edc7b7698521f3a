//! Cross-sensor reliability check for beds.
//!
//! On a bed with both a vital-sign sensor and a presence radar bound, vitals
//! should be corroborated by the radar seeing somebody. Vitals while the
//! radar sees nobody point at interference rather than a patient. The
//! result is a [`AlarmStatus::Suppressed`] candidate: it marks the bed's
//! vitals as unreliable and is never persisted or paged.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

use carewatch_cache::StateKey;
use carewatch_core::config::RuleThresholds;
use carewatch_core::{
    AlarmCategory, AlarmStatus, DeviceType, MonitoredEntity, Reading, SensorSource, Severity,
    TriggerSnapshot,
};

use crate::error::RuleError;
use crate::rule::{RaisedAlarm, Rule};
use crate::rules::elapsed_secs;
use crate::state::{RuleStateStore, SensorConflictState};

pub const NAME: &str = "sensor_reliability";
pub const EVENT_TYPE: &str = "sensor_reliability_conflict";

pub struct SensorReliabilityRule {
    dwell: Duration,
}

impl SensorReliabilityRule {
    pub fn new(dwell_secs: u64) -> Self {
        Self {
            dwell: Duration::seconds(dwell_secs as i64),
        }
    }

    pub fn from_thresholds(t: &RuleThresholds) -> Self {
        Self::new(t.sensor_conflict_dwell_secs)
    }

    fn ttl(&self) -> StdDuration {
        StdDuration::from_secs((self.dwell.num_seconds().max(0) as u64) * 2 + 60)
    }

    fn in_conflict(reading: &Reading) -> bool {
        reading.has_vital_signs() && (reading.person_count == 0 || reading.postures.is_empty())
    }
}

#[async_trait]
impl Rule for SensorReliabilityRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self, entity: &MonitoredEntity) -> bool {
        entity.is_bed()
            && entity.has_device(DeviceType::VitalSignSensor)
            && entity.has_device(DeviceType::PresenceRadar)
    }

    async fn evaluate(
        &self,
        state: &RuleStateStore,
        entity: &MonitoredEntity,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<Vec<RaisedAlarm>, RuleError> {
        let key = StateKey::entity(&entity.id, NAME);

        if self.exit_conditions(entity, reading) {
            if state.exists(&key).await? {
                debug!(entity_id = %entity.id, rule = NAME, "sensors agree again");
                state.clear(&key).await?;
            }
            return Ok(vec![]);
        }

        let loaded = state.load::<SensorConflictState>(&key).await?;
        let Some(SensorConflictState { since }) = loaded else {
            state
                .save(&key, SensorConflictState { since: now }, self.ttl())
                .await?;
            return Ok(vec![]);
        };

        if now - since < self.dwell {
            state.touch(&key, self.ttl()).await?;
            return Ok(vec![]);
        }

        state.clear(&key).await?;

        let mut snapshot =
            TriggerSnapshot::new(reading.vital_source().unwrap_or(SensorSource::BedSensor));
        snapshot.heart_rate = reading.heart.value;
        snapshot.breath_rate = reading.breath.value;
        snapshot.duration_secs = Some(elapsed_secs(since, now));

        let mut flagged =
            RaisedAlarm::new(EVENT_TYPE, AlarmCategory::Device, Severity::Low, snapshot)
                .with_metadata(json!({
                    "rule": NAME,
                    "person_count": reading.person_count,
                    "conflict_since": since,
                }));
        flagged.status = AlarmStatus::Suppressed;
        Ok(vec![flagged])
    }

    fn exit_conditions(&self, _entity: &MonitoredEntity, reading: &Reading) -> bool {
        !Self::in_conflict(reading)
    }
}
