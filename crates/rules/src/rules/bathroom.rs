//! Prolonged motionless standing in a bathroom.

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
use crate::state::{BathroomStandingState, RuleStateStore};

pub const NAME: &str = "bathroom_standing";
pub const EVENT_TYPE: &str = "bathroom_prolonged_standing";

const BATHROOM_KEYWORDS: &[&str] = &[
    "bathroom", "restroom", "toilet", "washroom", "lavatory", "卫生间", "洗手间", "厕所", "浴室",
];

/// Abbreviations that only count as a whole word.
const BATHROOM_WORDS: &[&str] = &["wc"];

/// Whether the entity's own name or any bound device location names a bathroom.
pub fn is_bathroom(entity: &MonitoredEntity) -> bool {
    entity.location_names().any(|name| {
        let name = name.to_lowercase();
        BATHROOM_KEYWORDS.iter().any(|kw| name.contains(kw))
            || name
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| BATHROOM_WORDS.contains(&word))
    })
}

pub struct BathroomStandingRule {
    threshold: Duration,
    position_tolerance_m: f64,
}

impl BathroomStandingRule {
    pub fn new(threshold_secs: u64, position_tolerance_m: f64) -> Self {
        Self {
            threshold: Duration::seconds(threshold_secs as i64),
            position_tolerance_m,
        }
    }

    pub fn from_thresholds(t: &RuleThresholds) -> Self {
        Self::new(t.bathroom_standing_secs, t.bathroom_position_tolerance_m)
    }

    fn ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.threshold.num_seconds().max(0) as u64 + 120)
    }

    /// The single standing subject, if the reading shows exactly that.
    fn lone_stander(reading: &Reading) -> Option<&Posture> {
        match reading.postures.as_slice() {
            [only] if reading.person_count == 1 && only.kind() == PostureKind::Standing => {
                Some(only)
            }
            _ => None,
        }
    }

    fn still_in_place(&self, prior: &BathroomStandingState, subject: &Posture) -> bool {
        if prior.track_id != subject.track_id {
            return false;
        }
        match (prior.position, subject.position()) {
            (Some(a), Some(b)) => a.distance_to(&b) <= self.position_tolerance_m,
            _ => true,
        }
    }
}

#[async_trait]
impl Rule for BathroomStandingRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self, entity: &MonitoredEntity) -> bool {
        entity.is_area() && is_bathroom(entity)
    }

    async fn evaluate(
        &self,
        state: &RuleStateStore,
        entity: &MonitoredEntity,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<Vec<RaisedAlarm>, RuleError> {
        let key = StateKey::entity(&entity.id, NAME);

        let Some(subject) = Self::lone_stander(reading) else {
            if state.exists(&key).await? {
                state.clear(&key).await?;
            }
            return Ok(vec![]);
        };

        let fresh = BathroomStandingState {
            track_id: subject.track_id.clone(),
            since: now,
            position: subject.position(),
        };

        let prior = match state.load::<BathroomStandingState>(&key).await? {
            Some(prior) if self.still_in_place(&prior, subject) => prior,
            Some(_) => {
                debug!(entity_id = %entity.id, rule = NAME, "subject moved, timer reset");
                state.save(&key, fresh, self.ttl()).await?;
                return Ok(vec![]);
            }
            None => {
                state.save(&key, fresh, self.ttl()).await?;
                return Ok(vec![]);
            }
        };

        if now - prior.since < self.threshold {
            state.touch(&key, self.ttl()).await?;
            return Ok(vec![]);
        }

        state.clear(&key).await?;

        let mut snapshot = TriggerSnapshot::new(SensorSource::Radar);
        snapshot.heart_rate = reading.heart.value;
        snapshot.breath_rate = reading.breath.value;
        snapshot.posture = Some(subject.display_label());
        snapshot.duration_secs = Some(elapsed_secs(prior.since, now));

        Ok(vec![RaisedAlarm::new(
            EVENT_TYPE,
            AlarmCategory::Safety,
            Severity::Medium,
            snapshot,
        )
        .with_metadata(json!({
            "rule": NAME,
            "track_id": prior.track_id,
            "standing_since": prior.since,
            "threshold_secs": self.threshold.num_seconds(),
        }))])
    }

    fn exit_conditions(&self, _entity: &MonitoredEntity, reading: &Reading) -> bool {
        Self::lone_stander(reading).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures::{at, state_store};
    use carewatch_core::{DeviceType, EntityKind};

    fn bathroom() -> MonitoredEntity {
        MonitoredEntity::new("a-7", "t-1", EntityKind::Area)
            .with_name("Room 7")
            .with_binding("r-7", DeviceType::PresenceRadar, Some("Room 7 Bathroom"))
    }

    fn standing(secs: i64, x: f64) -> Reading {
        let mut r = Reading::empty(at(secs));
        r.person_count = 1;
        r.postures = vec![Posture::new("3", PostureKind::Standing).at(x, 1.0, 1.6)];
        r
    }

    #[test]
    fn classifies_bathrooms_by_any_location_name() {
        assert!(is_bathroom(&bathroom()));
        assert!(is_bathroom(
            &MonitoredEntity::new("a-8", "t-1", EntityKind::Area).with_name("2F 卫生间")
        ));
        assert!(is_bathroom(
            &MonitoredEntity::new("a-9", "t-1", EntityKind::Area).with_name("Guest WC")
        ));
        assert!(!is_bathroom(
            &MonitoredEntity::new("a-10", "t-1", EntityKind::Area).with_name("Lounge")
        ));
    }

    #[test]
    fn wc_must_stand_alone() {
        let named =
            |name: &str| MonitoredEntity::new("a-11", "t-1", EntityKind::Area).with_name(name);
        assert!(is_bathroom(&named("Ward 3-WC")));
        assert!(is_bathroom(&named("wc")));
        assert!(!is_bathroom(&named("Newcastle Suite")));
        assert!(!is_bathroom(&named("Nurses AWC")));
    }

    #[tokio::test]
    async fn fires_after_threshold_without_movement() {
        let (rule, state, area) = (BathroomStandingRule::new(300, 0.3), state_store(), bathroom());

        assert!(rule.evaluate(&state, &area, &standing(0, 1.0), at(0)).await.unwrap().is_empty());
        let r = standing(150, 1.1);
        assert!(rule.evaluate(&state, &area, &r, at(150)).await.unwrap().is_empty());

        let raised = rule.evaluate(&state, &area, &standing(301, 1.0), at(301)).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].snapshot.posture.as_deref(), Some("standing"));
        assert_eq!(raised[0].snapshot.duration_secs, Some(301));
    }

    #[tokio::test]
    async fn moving_resets_the_timer() {
        let (rule, state, area) = (BathroomStandingRule::new(300, 0.3), state_store(), bathroom());

        rule.evaluate(&state, &area, &standing(0, 1.0), at(0)).await.unwrap();
        rule.evaluate(&state, &area, &standing(200, 2.0), at(200)).await.unwrap();
        let r = standing(301, 2.0);
        assert!(rule.evaluate(&state, &area, &r, at(301)).await.unwrap().is_empty());

        let raised = rule.evaluate(&state, &area, &standing(500, 2.0), at(500)).await.unwrap();
        assert_eq!(raised.len(), 1);
    }

    #[tokio::test]
    async fn two_people_never_alarm() {
        let (rule, state, area) = (BathroomStandingRule::new(300, 0.3), state_store(), bathroom());

        for secs in [0, 200, 400, 600] {
            let mut r = standing(secs, 1.0);
            r.person_count = 2;
            assert!(rule.exit_conditions(&area, &r));
            assert!(rule.evaluate(&state, &area, &r, at(secs)).await.unwrap().is_empty());
        }
        assert!(!state.exists(&StateKey::entity("a-7", NAME)).await.unwrap());
    }

    #[tokio::test]
    async fn sitting_clears_progress() {
        let (rule, state, area) = (BathroomStandingRule::new(300, 0.3), state_store(), bathroom());
        rule.evaluate(&state, &area, &standing(0, 1.0), at(0)).await.unwrap();

        let mut seated = standing(100, 1.0);
        seated.postures = vec![Posture::new("3", PostureKind::Sitting).at(1.0, 1.0, 0.9)];
        rule.evaluate(&state, &area, &seated, at(100)).await.unwrap();
        assert!(!state.exists(&StateKey::entity("a-7", NAME)).await.unwrap());
    }
}
