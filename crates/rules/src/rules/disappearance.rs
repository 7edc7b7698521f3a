//! Sudden disappearance: a tracked subject's height drops sharply and the
//! track then vanishes, typical of a fall out of the radar's field of view.
//!
//! Per-track height history lives under `track_{id}`; the set of tracks seen
//! on the previous reading lives under [`ROSTER_TRACK`].
//!
//! Beds are excluded. Lying down in bed is a drop of the same size, and the
//! radar routinely loses a still sleeper.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

use carewatch_cache::StateKey;
use carewatch_core::config::RuleThresholds;
use carewatch_core::{
    AlarmCategory, MonitoredEntity, Posture, PostureKind, Reading, SensorSource, Severity,
    TriggerSnapshot,
};

use crate::error::RuleError;
use crate::rule::{RaisedAlarm, Rule};
use crate::rules::elapsed_secs;
use crate::state::{DropMark, HeightSample, RuleStateStore, TrackHistoryState, TrackRosterState};

pub const NAME: &str = "sudden_disappearance";
pub const EVENT_TYPE: &str = "sudden_disappearance";

/// Track slot holding the roster. Radar track ids are numeric.
pub const ROSTER_TRACK: &str = "roster";

pub struct SuddenDisappearanceRule {
    drop_m: f64,
    window: Duration,
}

fn is_upright(p: &Posture) -> bool {
    matches!(p.kind(), PostureKind::Standing | PostureKind::Walking)
}

impl SuddenDisappearanceRule {
    pub fn new(drop_m: f64, window_secs: u64) -> Self {
        Self {
            drop_m,
            window: Duration::seconds(window_secs as i64),
        }
    }

    pub fn from_thresholds(t: &RuleThresholds) -> Self {
        Self::new(t.disappearance_drop_m, t.disappearance_window_secs)
    }

    fn ttl(&self) -> StdDuration {
        let window = self.window.num_seconds().max(0) as u64;
        StdDuration::from_secs((window * 4).max(60))
    }

    /// Fold one observation into a track's history.
    ///
    /// The drop reference is the highest sample inside the window, or the
    /// previous sample when the window holds none.
    fn observe(&self, history: &mut TrackHistoryState, posture: &Posture, now: DateTime<Utc>) {
        history.last_seen = now;
        history.last_posture = Some(posture.display_label());

        if is_upright(posture) {
            history.drop = None;
        }

        let Some(z) = posture.z else {
            return;
        };

        if let Some(mark) = history.drop {
            if z - mark.to_z >= self.drop_m / 2.0 {
                history.drop = None;
            }
        }

        let horizon = now - self.window;
        let last = history.samples.last().copied();
        history.samples.retain(|s| s.at >= horizon);
        if history.samples.is_empty() {
            history.samples.extend(last);
        }

        let peak = history.samples.iter().map(|s| s.z).reduce(f64::max);
        if let Some(peak) = peak {
            if history.drop.is_none() && peak - z >= self.drop_m {
                history.drop = Some(DropMark {
                    at: now,
                    from_z: peak,
                    to_z: z,
                });
            }
        }

        history.samples.push(HeightSample { at: now, z });
    }

    fn raise(
        &self,
        track_id: &str,
        history: &TrackHistoryState,
        mark: DropMark,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> RaisedAlarm {
        let mut snapshot = TriggerSnapshot::new(SensorSource::Radar);
        snapshot.heart_rate = reading.heart.value;
        snapshot.breath_rate = reading.breath.value;
        snapshot.posture = history.last_posture.clone();
        snapshot.confidence = Some((mark.depth() / (2.0 * self.drop_m)).min(1.0));
        snapshot.duration_secs = Some(elapsed_secs(mark.at, now));

        RaisedAlarm::new(EVENT_TYPE, AlarmCategory::Safety, Severity::High, snapshot).with_metadata(
            json!({
                "rule": NAME,
                "track_id": track_id,
                "drop_from_z": mark.from_z,
                "drop_to_z": mark.to_z,
                "dropped_at": mark.at,
                "last_seen": history.last_seen,
            }),
        )
    }
}

#[async_trait]
impl Rule for SuddenDisappearanceRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self, entity: &MonitoredEntity) -> bool {
        !entity.is_bed()
    }

    async fn evaluate(
        &self,
        state: &RuleStateStore,
        entity: &MonitoredEntity,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<Vec<RaisedAlarm>, RuleError> {
        let roster_key = StateKey::new(&entity.id, ROSTER_TRACK, NAME);
        let roster = state
            .load::<TrackRosterState>(&roster_key)
            .await?
            .unwrap_or_default();

        for posture in &reading.postures {
            let key = StateKey::new(&entity.id, &posture.track_id, NAME);
            let mut history = state
                .load::<TrackHistoryState>(&key)
                .await?
                .unwrap_or_else(|| TrackHistoryState::new(now));
            self.observe(&mut history, posture, now);
            state.save(&key, history, self.ttl()).await?;
        }

        let mut raised = Vec::new();
        for gone in roster
            .track_ids
            .iter()
            .filter(|id| reading.track(id).is_none())
        {
            let key = StateKey::new(&entity.id, gone, NAME);
            match state.load::<TrackHistoryState>(&key).await? {
                Some(history) => match history.drop {
                    Some(mark) => raised.push(self.raise(gone, &history, mark, reading, now)),
                    None => debug!(entity_id = %entity.id, track_id = %gone, "track left the area"),
                },
                None => debug!(entity_id = %entity.id, track_id = %gone, "track history expired"),
            }
            state.clear(&key).await?;
        }

        let track_ids: Vec<String> = reading
            .postures
            .iter()
            .map(|p| p.track_id.clone())
            .collect();
        if !track_ids.is_empty() {
            state
                .save(&roster_key, TrackRosterState { track_ids }, self.ttl())
                .await?;
        } else if !roster.track_ids.is_empty() {
            state.clear(&roster_key).await?;
        }

        Ok(raised)
    }

    fn exit_conditions(&self, _entity: &MonitoredEntity, reading: &Reading) -> bool {
        !reading.postures.is_empty() && reading.postures.iter().all(is_upright)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures::{at, state_store};
    use carewatch_core::EntityKind;

    fn room() -> MonitoredEntity {
        MonitoredEntity::new("a-1", "t-1", EntityKind::Area)
    }

    fn with_track(secs: i64, kind: PostureKind, z: f64) -> Reading {
        let mut r = Reading::empty(at(secs));
        r.person_count = 1;
        r.postures = vec![Posture::new("5", kind).at(2.0, 2.0, z)];
        r
    }

    fn empty(secs: i64) -> Reading {
        Reading::empty(at(secs))
    }

    #[tokio::test]
    async fn drop_then_vanish_fires() {
        let (rule, state, room) = (SuddenDisappearanceRule::new(0.6, 5), state_store(), room());

        rule.evaluate(&state, &room, &with_track(0, PostureKind::Standing, 1.6), at(0))
            .await
            .unwrap();
        rule.evaluate(&state, &room, &with_track(3, PostureKind::Lying, 0.3), at(3))
            .await
            .unwrap();

        let raised = rule.evaluate(&state, &room, &empty(6), at(6)).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].event_type, EVENT_TYPE);
        assert_eq!(raised[0].metadata["track_id"], "5");
        assert_eq!(raised[0].snapshot.posture.as_deref(), Some("lying"));
        assert_eq!(raised[0].snapshot.confidence, Some(1.0));

        assert!(!state.exists(&StateKey::new("a-1", "5", NAME)).await.unwrap());
        assert!(!state.exists(&StateKey::new("a-1", ROSTER_TRACK, NAME)).await.unwrap());
    }

    #[tokio::test]
    async fn walking_out_is_not_a_disappearance() {
        let (rule, state, room) = (SuddenDisappearanceRule::new(0.6, 5), state_store(), room());

        rule.evaluate(&state, &room, &with_track(0, PostureKind::Walking, 1.6), at(0))
            .await
            .unwrap();
        rule.evaluate(&state, &room, &with_track(5, PostureKind::Walking, 1.55), at(5))
            .await
            .unwrap();
        assert!(rule.evaluate(&state, &room, &empty(10), at(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn getting_back_up_clears_the_drop() {
        let (rule, state, room) = (SuddenDisappearanceRule::new(0.6, 5), state_store(), room());

        rule.evaluate(&state, &room, &with_track(0, PostureKind::Standing, 1.6), at(0))
            .await
            .unwrap();
        rule.evaluate(&state, &room, &with_track(2, PostureKind::Fallen, 0.2), at(2))
            .await
            .unwrap();
        rule.evaluate(&state, &room, &with_track(4, PostureKind::Standing, 1.6), at(4))
            .await
            .unwrap();
        assert!(rule.evaluate(&state, &room, &empty(6), at(6)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn previous_sample_is_the_reference_when_window_is_empty() {
        let (rule, state, room) = (SuddenDisappearanceRule::new(0.6, 5), state_store(), room());

        rule.evaluate(&state, &room, &with_track(0, PostureKind::Standing, 1.6), at(0))
            .await
            .unwrap();
        rule.evaluate(&state, &room, &with_track(6, PostureKind::Lying, 0.4), at(6))
            .await
            .unwrap();
        let raised = rule.evaluate(&state, &room, &empty(12), at(12)).await.unwrap();
        assert_eq!(raised.len(), 1);
    }

    #[test]
    fn applies_to_rooms_and_uncatalogued_entities() {
        let rule = SuddenDisappearanceRule::new(0.6, 5);
        assert!(rule.applies_to(&room()));
        assert!(rule.applies_to(&MonitoredEntity::new("x-1", "t-1", EntityKind::Unknown)));
        assert!(!rule.applies_to(&MonitoredEntity::new("card-1", "t-1", EntityKind::Bed)));
    }

    #[test]
    fn exit_only_when_every_track_is_upright() {
        let rule = SuddenDisappearanceRule::new(0.6, 5);
        assert!(rule.exit_conditions(&room(), &with_track(0, PostureKind::Walking, 1.6)));
        assert!(!rule.exit_conditions(&room(), &with_track(0, PostureKind::Lying, 0.3)));
        assert!(!rule.exit_conditions(&room(), &empty(0)));
    }
}
