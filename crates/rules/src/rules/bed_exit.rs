//! Fall-from-bed detection.
//!
//! `NoTrack -> Baseline -> LeftBed -> (alarm | exit)`. The bed reads empty,
//! no vital-sign source reports and nobody is seen moving; if that holds for
//! the full dwell the occupant is presumed on the floor next to the bed.
//!
//! An exit while the bed stays empty leaves an [`BedExitState::Exited`]
//! marker under [`EXITED_TRACK`]. Only an occupied reading lifts it, so a new
//! episode always starts from the bed being occupied again.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

use carewatch_cache::StateKey;
use carewatch_core::config::RuleThresholds;
use carewatch_core::{
    AlarmCategory, ClinicalCode, MonitoredEntity, Position, PostureKind, Reading, SensorSource,
    Severity, TriggerSnapshot,
};

use crate::error::RuleError;
use crate::rule::{RaisedAlarm, Rule};
use crate::rules::elapsed_secs;
use crate::state::{BedExitState, RuleStateStore};

pub const NAME: &str = "bed_exit_fall";
pub const EVENT_TYPE: &str = "fall_from_bed";

/// Track slot of the exit marker.
pub const EXITED_TRACK: &str = "exited";

pub struct BedExitRule {
    dwell: Duration,
    motion_tolerance_m: f64,
}

impl BedExitRule {
    pub fn new(dwell_secs: u64, motion_tolerance_m: f64) -> Self {
        Self {
            dwell: Duration::seconds(dwell_secs as i64),
            motion_tolerance_m,
        }
    }

    pub fn from_thresholds(t: &RuleThresholds) -> Self {
        Self::new(t.bed_exit_dwell_secs, t.bed_exit_motion_tolerance_m)
    }

    fn ttl(&self) -> StdDuration {
        StdDuration::from_secs((self.dwell.num_seconds().max(0) as u64) * 2 + 60)
    }

    /// Subject seen away from where it was when the bed emptied.
    fn moved_from(&self, baseline: Option<&Position>, reading: &Reading) -> bool {
        let Some(baseline) = baseline else {
            return false;
        };
        reading
            .postures
            .iter()
            .filter_map(|p| p.position())
            .any(|p| p.distance_to(baseline) > self.motion_tolerance_m)
    }

    fn raise(
        &self,
        reading: &Reading,
        left_at: DateTime<Utc>,
        baseline_posture: Option<String>,
        now: DateTime<Utc>,
    ) -> RaisedAlarm {
        let duration = elapsed_secs(left_at, now);
        let mut snapshot = TriggerSnapshot::new(SensorSource::BedSensor);
        snapshot.heart_rate = reading.heart.value;
        snapshot.breath_rate = reading.breath.value;
        snapshot.posture = reading
            .postures
            .first()
            .map(|p| p.display_label())
            .or(baseline_posture.clone());
        snapshot.duration_secs = Some(duration);
        snapshot.clinical_code = Some(ClinicalCode::snomed("1912002", "Fall"));

        RaisedAlarm::new(EVENT_TYPE, AlarmCategory::Safety, Severity::High, snapshot).with_metadata(
            json!({
                "rule": NAME,
                "left_bed_at": left_at,
                "dwell_secs": self.dwell.num_seconds(),
                "baseline_posture": baseline_posture,
            }),
        )
    }
}

#[async_trait]
impl Rule for BedExitRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self, entity: &MonitoredEntity) -> bool {
        entity.is_bed()
    }

    async fn evaluate(
        &self,
        state: &RuleStateStore,
        entity: &MonitoredEntity,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<Vec<RaisedAlarm>, RuleError> {
        let key = StateKey::entity(&entity.id, NAME);
        let marker = StateKey::new(&entity.id, EXITED_TRACK, NAME);
        let current = state.load::<BedExitState>(&key).await?;

        match current {
            Some(BedExitState::LeftBed {
                left_at,
                baseline_posture,
                baseline_position,
            }) => {
                let exited = self.exit_conditions(entity, reading)
                    || self.moved_from(baseline_position.as_ref(), reading);
                if exited {
                    debug!(entity_id = %entity.id, rule = NAME, "bed exit cleared");
                    state.clear(&key).await?;
                    if reading.is_occupied() {
                        self.observe_baseline(state, &key, reading, now).await?;
                    } else {
                        state
                            .save(&marker, BedExitState::Exited { at: now }, self.ttl())
                            .await?;
                    }
                    return Ok(vec![]);
                }

                if now - left_at >= self.dwell {
                    state.clear(&key).await?;
                    return Ok(vec![self.raise(reading, left_at, baseline_posture, now)]);
                }

                state.touch(&key, self.ttl()).await?;
                Ok(vec![])
            }
            baseline => {
                if reading.is_occupied() {
                    state.clear(&marker).await?;
                    self.observe_baseline(state, &key, reading, now).await?;
                    return Ok(vec![]);
                }
                if !reading.is_unoccupied() {
                    return Ok(vec![]);
                }
                if state.touch(&marker, self.ttl()).await? {
                    debug!(
                        entity_id = %entity.id,
                        rule = NAME,
                        "episode already exited, waiting for bed return"
                    );
                    return Ok(vec![]);
                }
                if !self.exit_conditions(entity, reading) {
                    let (baseline_posture, baseline_position) = match baseline {
                        Some(BedExitState::Baseline {
                            posture, position, ..
                        }) => (posture, position),
                        _ => (None, None),
                    };
                    debug!(entity_id = %entity.id, rule = NAME, "bed empty without vitals, armed");
                    state
                        .save(
                            &key,
                            BedExitState::LeftBed {
                                left_at: now,
                                baseline_posture,
                                baseline_position,
                            },
                            self.ttl(),
                        )
                        .await?;
                }
                Ok(vec![])
            }
        }
    }

    fn exit_conditions(&self, _entity: &MonitoredEntity, reading: &Reading) -> bool {
        reading.has_vital_signs()
            || reading.is_occupied()
            || reading
                .postures
                .iter()
                .any(|p| p.kind() == PostureKind::Walking)
    }
}

impl BedExitRule {
    async fn observe_baseline(
        &self,
        state: &RuleStateStore,
        key: &StateKey,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<(), RuleError> {
        let first = reading.postures.first();
        state
            .save(
                key,
                BedExitState::Baseline {
                    posture: first.map(|p| p.display_label()),
                    position: first.and_then(|p| p.position()),
                    observed_at: now,
                },
                self.ttl(),
            )
            .await
    }
}
