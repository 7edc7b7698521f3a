//! The capability every detection rule implements, and the rule registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use carewatch_core::config::RuleThresholds;
use carewatch_core::{
    AlarmCategory, AlarmStatus, MonitoredEntity, Reading, Severity, TriggerSnapshot,
};

use crate::error::RuleError;
use crate::rules::{
    BathroomStandingRule, BedExitRule, SensorReliabilityRule, SuddenDisappearanceRule,
};
use crate::state::RuleStateStore;

/// Raw output of a rule, turned into an [`AlarmEvent`](carewatch_core::AlarmEvent)
/// by the [`AlarmBuilder`](crate::builder::AlarmBuilder).
#[derive(Debug, Clone, PartialEq)]
pub struct RaisedAlarm {
    pub event_type: &'static str,
    pub category: AlarmCategory,
    pub severity: Severity,
    /// Rules may downgrade a candidate; only active ones are persisted.
    pub status: AlarmStatus,
    pub snapshot: TriggerSnapshot,
    pub metadata: Value,
}

impl RaisedAlarm {
    pub fn new(
        event_type: &'static str,
        category: AlarmCategory,
        severity: Severity,
        snapshot: TriggerSnapshot,
    ) -> Self {
        Self {
            event_type,
            category,
            severity,
            status: AlarmStatus::Active,
            snapshot,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AlarmStatus::Active
    }
}

/// A stateful detection rule.
///
/// Rules keep their progress in the [`RuleStateStore`] under keys carrying
/// their own [`name`](Rule::name), and never touch another rule's keys.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Stable rule name, also the state namespace.
    fn name(&self) -> &'static str;

    /// Whether the rule is meaningful for this entity at all.
    fn applies_to(&self, entity: &MonitoredEntity) -> bool;

    /// Advance the rule's state machine with the latest reading.
    async fn evaluate(
        &self,
        state: &RuleStateStore,
        entity: &MonitoredEntity,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Result<Vec<RaisedAlarm>, RuleError>;

    /// True when the reading ends any in-progress sequence without an alarm.
    fn exit_conditions(&self, entity: &MonitoredEntity, reading: &Reading) -> bool;
}

/// Ordered list of rules the orchestrator fans readings out to.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four production rules, configured from thresholds.
    pub fn standard(thresholds: &RuleThresholds) -> Self {
        Self::new()
            .with(BedExitRule::from_thresholds(thresholds))
            .with(SensorReliabilityRule::from_thresholds(thresholds))
            .with(BathroomStandingRule::from_thresholds(thresholds))
            .with(SuddenDisappearanceRule::from_thresholds(thresholds))
    }

    pub fn with<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_has_all_rules_in_order() {
        let set = RuleSet::standard(&RuleThresholds::default());
        assert_eq!(
            set.names(),
            vec![
                "bed_exit_fall",
                "sensor_reliability",
                "bathroom_standing",
                "sudden_disappearance"
            ]
        );
    }

    #[test]
    fn raised_alarm_defaults_to_active() {
        let raised = RaisedAlarm::new(
            "x",
            AlarmCategory::Device,
            Severity::Low,
            TriggerSnapshot::new(carewatch_core::SensorSource::Radar),
        );
        assert!(raised.is_active());
        assert!(raised.metadata.as_object().unwrap().is_empty());
    }
}
