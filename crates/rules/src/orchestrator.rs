//! Per-entity evaluation: reading -> rules -> dedup -> persist -> mirror.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use carewatch_core::{AlarmEvent, MonitoredEntity};

use crate::builder::AlarmBuilder;
use crate::context::TenantContext;
use crate::error::EngineError;
use crate::rule::{RaisedAlarm, RuleSet};

/// What happened to one entity during a pass.
#[derive(Debug, Clone, Default)]
pub struct EntityOutcome {
    /// False when no reading was cached; nothing else ran.
    pub reading_found: bool,
    pub persisted: Vec<AlarmEvent>,
    /// Candidates dropped because an equivalent active alarm is recent.
    pub suppressed: usize,
    /// Event types of non-active candidates, such as sensor conflicts.
    pub withheld: Vec<&'static str>,
    pub rules_run: Vec<&'static str>,
    pub rule_failures: Vec<&'static str>,
    pub persist_failures: usize,
}

pub struct Orchestrator {
    rules: RuleSet,
}

impl Orchestrator {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate one entity and persist whatever it newly raises.
    ///
    /// Only a failure to read the cached reading is returned as an error;
    /// rule and persistence failures are logged and counted in the outcome.
    pub async fn evaluate(
        &self,
        ctx: &TenantContext,
        entity: &MonitoredEntity,
        now: DateTime<Utc>,
    ) -> Result<EntityOutcome, EngineError> {
        let reading = match ctx.gateway.get_reading(&entity.id).await {
            Ok(reading) => reading,
            Err(e) if e.is_not_found() => {
                debug!(entity_id = %entity.id, "no reading yet, skipping");
                return Ok(EntityOutcome::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut outcome = EntityOutcome {
            reading_found: true,
            ..Default::default()
        };

        let mut raised: Vec<RaisedAlarm> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.applies_to(entity)) {
            outcome.rules_run.push(rule.name());
            match rule.evaluate(&ctx.state, entity, &reading, now).await {
                Ok(mut alarms) => raised.append(&mut alarms),
                Err(e) => {
                    warn!(
                        entity_id = %entity.id,
                        rule = rule.name(),
                        error = %e,
                        "rule evaluation failed"
                    );
                    outcome.rule_failures.push(rule.name());
                }
            }
        }

        let (active, withheld): (Vec<RaisedAlarm>, Vec<RaisedAlarm>) =
            raised.into_iter().partition(RaisedAlarm::is_active);
        for flagged in &withheld {
            info!(
                entity_id = %entity.id,
                event_type = flagged.event_type,
                status = %flagged.status,
                "candidate withheld"
            );
            outcome.withheld.push(flagged.event_type);
        }
        if active.is_empty() {
            return Ok(outcome);
        }

        let builder = AlarmBuilder::new(ctx.tenant_id.clone());
        for candidate in active {
            let event_type = candidate.event_type;
            match ctx
                .alarms
                .has_recent(
                    &ctx.tenant_id,
                    &entity.id,
                    event_type,
                    ctx.engine.dedup_window_minutes,
                    now,
                )
                .await
            {
                Ok(true) => {
                    debug!(
                        entity_id = %entity.id,
                        event_type,
                        "recent active alarm exists, suppressed"
                    );
                    outcome.suppressed += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        entity_id = %entity.id,
                        event_type,
                        error = %e,
                        "dedup lookup failed, alarm dropped"
                    );
                    outcome.persist_failures += 1;
                    continue;
                }
            }

            let event = match builder.build(&entity.id, candidate, now) {
                Ok(event) => event,
                Err(e) => {
                    warn!(entity_id = %entity.id, event_type, error = %e, "failed to encode alarm");
                    outcome.persist_failures += 1;
                    continue;
                }
            };

            match ctx.alarms.create(&event).await {
                Ok(()) => {
                    info!(
                        entity_id = %entity.id,
                        event_type,
                        alarm_id = %event.id,
                        severity = %event.severity,
                        "alarm raised"
                    );
                    outcome.persisted.push(event);
                }
                Err(e) => {
                    warn!(entity_id = %entity.id, event_type, error = %e, "alarm persist failed");
                    outcome.persist_failures += 1;
                }
            }
        }

        self.refresh_mirror(ctx, entity, &outcome.persisted).await;
        Ok(outcome)
    }

    /// Overwrite the active-alarm mirror with the store's view of the entity,
    /// or with this pass's new alarms if the store can't be read.
    async fn refresh_mirror(
        &self,
        ctx: &TenantContext,
        entity: &MonitoredEntity,
        persisted: &[AlarmEvent],
    ) {
        let active = match ctx.alarms.list_active(&ctx.tenant_id, &entity.id).await {
            Ok(active) => active,
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "active alarm listing failed");
                persisted.to_vec()
            }
        };
        if active.is_empty() {
            return;
        }
        if let Err(e) = ctx.gateway.put_active_alarms(&entity.id, &active).await {
            warn!(entity_id = %entity.id, error = %e, "active alarm mirror write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use carewatch_cache::{KeyLayout, MemoryKv};
    use carewatch_core::config::EngineConfig;
    use carewatch_core::{
        AlarmCategory, AlarmStatus, EntityKind, Reading, SensorSource, Severity, TriggerSnapshot,
    };
    use carewatch_storage::{MemoryAlarmStore, StaticCatalog};

    use crate::error::RuleError;
    use crate::rule::Rule;
    use crate::state::RuleStateStore;

    struct Always {
        name: &'static str,
        status: AlarmStatus,
    }

    #[async_trait]
    impl Rule for Always {
        fn name(&self) -> &'static str {
            self.name
        }
        fn applies_to(&self, _: &MonitoredEntity) -> bool {
            true
        }
        async fn evaluate(
            &self,
            _: &RuleStateStore,
            _: &MonitoredEntity,
            _: &Reading,
            _: DateTime<Utc>,
        ) -> Result<Vec<RaisedAlarm>, RuleError> {
            let mut raised = RaisedAlarm::new(
                self.name,
                AlarmCategory::Safety,
                Severity::High,
                TriggerSnapshot::new(SensorSource::Fused),
            );
            raised.status = self.status;
            Ok(vec![raised])
        }
        fn exit_conditions(&self, _: &MonitoredEntity, _: &Reading) -> bool {
            false
        }
    }

    struct Broken;

    #[async_trait]
    impl Rule for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn applies_to(&self, _: &MonitoredEntity) -> bool {
            true
        }
        async fn evaluate(
            &self,
            _: &RuleStateStore,
            _: &MonitoredEntity,
            _: &Reading,
            _: DateTime<Utc>,
        ) -> Result<Vec<RaisedAlarm>, RuleError> {
            Err(RuleError::StateMismatch {
                rule: "broken".to_string(),
                found: "track_roster",
            })
        }
        fn exit_conditions(&self, _: &MonitoredEntity, _: &Reading) -> bool {
            false
        }
    }

    fn active(name: &'static str) -> Always {
        Always {
            name,
            status: AlarmStatus::Active,
        }
    }

    struct Harness {
        ctx: TenantContext,
        kv: Arc<MemoryKv>,
        alarms: Arc<MemoryAlarmStore>,
    }

    fn harness() -> Harness {
        let kv = Arc::new(MemoryKv::new());
        let alarms = Arc::new(MemoryAlarmStore::new());
        let ctx = TenantContext::new(
            "t-1",
            kv.clone(),
            KeyLayout::default(),
            alarms.clone(),
            Arc::new(StaticCatalog::default()),
            EngineConfig::default(),
        );
        Harness { ctx, kv, alarms }
    }

    fn entity() -> MonitoredEntity {
        MonitoredEntity::new("card-1", "t-1", EntityKind::Bed)
    }

    async fn seed_reading(h: &Harness) {
        h.ctx
            .gateway
            .put_reading("card-1", &Reading::empty(Utc::now()), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_reading_skips_without_side_effects() {
        let h = harness();
        let orch = Orchestrator::new(RuleSet::new().with(active("a")));

        let outcome = orch.evaluate(&h.ctx, &entity(), Utc::now()).await.unwrap();
        assert!(!outcome.reading_found);
        assert!(outcome.persisted.is_empty());
        assert!(outcome.rules_run.is_empty());
        assert!(h.kv.is_empty());
        assert_eq!(h.alarms.count(), 0);
    }

    #[tokio::test]
    async fn failing_rule_does_not_suppress_others() {
        let h = harness();
        seed_reading(&h).await;
        let orch = Orchestrator::new(RuleSet::new().with(Broken).with(active("a")));

        let outcome = orch.evaluate(&h.ctx, &entity(), Utc::now()).await.unwrap();
        assert_eq!(outcome.rule_failures, vec!["broken"]);
        assert_eq!(outcome.persisted.len(), 1);
        assert_eq!(h.ctx.gateway.get_active_alarms("card-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_candidates_are_dropped() {
        let h = harness();
        seed_reading(&h).await;
        let orch = Orchestrator::new(RuleSet::new().with(Always {
            name: "a",
            status: AlarmStatus::Suppressed,
        }));

        let outcome = orch.evaluate(&h.ctx, &entity(), Utc::now()).await.unwrap();
        assert!(outcome.persisted.is_empty());
        assert_eq!(outcome.withheld, vec!["a"]);
        assert_eq!(h.alarms.count(), 0);
        assert!(h.ctx.gateway.get_active_alarms("card-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_condition_persists_once() {
        let h = harness();
        seed_reading(&h).await;
        let orch = Orchestrator::new(RuleSet::new().with(active("a")));
        let now = Utc::now();

        let first = orch.evaluate(&h.ctx, &entity(), now).await.unwrap();
        let second = orch
            .evaluate(&h.ctx, &entity(), now + chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(first.persisted.len(), 1);
        assert!(second.persisted.is_empty());
        assert_eq!(second.suppressed, 1);
        assert_eq!(h.alarms.count(), 1);

        let mirror = h.ctx.gateway.get_active_alarms("card-1").await.unwrap();
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror[0].id, first.persisted[0].id);
    }

    #[tokio::test]
    async fn persist_failures_are_isolated_per_alarm() {
        let h = harness();
        seed_reading(&h).await;
        h.alarms.set_fail_writes(true);
        let orch = Orchestrator::new(RuleSet::new().with(active("a")).with(active("b")));

        let outcome = orch.evaluate(&h.ctx, &entity(), Utc::now()).await.unwrap();
        assert_eq!(outcome.persist_failures, 2);
        assert!(outcome.persisted.is_empty());
    }
}
