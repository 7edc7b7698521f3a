use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::orchestrator::EntityOutcome;

/// Result of one evaluation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    /// Entities listed for the pass.
    pub entities: usize,
    /// Entities that had a reading and went through the rules.
    pub evaluated: usize,
    /// Entities without a cached reading.
    pub skipped: usize,
    pub alarms_persisted: usize,
    pub duplicates_suppressed: usize,
    /// Non-active candidates the rules produced.
    pub withheld: usize,
    pub rule_failures: usize,
    pub persist_failures: usize,
    pub entity_failures: usize,
    /// Per-rule evaluation counts for this pass.
    pub rule_runs: HashMap<String, u64>,
    pub failed_rules: HashMap<String, u64>,
    /// Entity list came from the cache scan instead of the catalog.
    pub used_fallback: bool,
    pub cancelled: bool,
    pub duration: Duration,
}

impl PassReport {
    pub fn record_entity(&mut self, outcome: &EntityOutcome) {
        if !outcome.reading_found {
            self.skipped += 1;
            return;
        }
        self.evaluated += 1;
        self.alarms_persisted += outcome.persisted.len();
        self.duplicates_suppressed += outcome.suppressed;
        self.withheld += outcome.withheld.len();
        self.rule_failures += outcome.rule_failures.len();
        self.persist_failures += outcome.persist_failures;
        for name in &outcome.rules_run {
            *self.rule_runs.entry(name.to_string()).or_default() += 1;
        }
        for name in &outcome.rule_failures {
            *self.failed_rules.entry(name.to_string()).or_default() += 1;
        }
    }

    /// One summary line per pass.
    pub fn log(&self, tenant_id: &str) {
        info!(
            tenant_id,
            entities = self.entities,
            evaluated = self.evaluated,
            skipped = self.skipped,
            alarms = self.alarms_persisted,
            suppressed = self.duplicates_suppressed,
            withheld = self.withheld,
            rule_failures = self.rule_failures,
            persist_failures = self.persist_failures,
            entity_failures = self.entity_failures,
            fallback = self.used_fallback,
            cancelled = self.cancelled,
            duration_ms = self.duration.as_millis() as u64,
            "evaluation pass complete"
        );
    }
}

/// Running totals across passes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassMetrics {
    /// Passes that got an entity list and ran (including cancelled ones).
    pub passes: u64,
    /// Passes aborted because the entity list could not be fetched.
    pub failed_passes: u64,
    pub cancelled_passes: u64,
    pub entities_evaluated: u64,
    pub alarms_persisted: u64,
    pub duplicates_suppressed: u64,
    pub withheld: u64,
    pub rule_runs: HashMap<String, u64>,
    pub rule_failures: HashMap<String, u64>,
    pub avg_pass_duration: Duration,
    pub last_pass: Option<DateTime<Utc>>,
}

impl PassMetrics {
    pub fn record_pass(&mut self, report: &PassReport, at: DateTime<Utc>) {
        self.passes += 1;
        if report.cancelled {
            self.cancelled_passes += 1;
        }
        self.entities_evaluated += report.evaluated as u64;
        self.alarms_persisted += report.alarms_persisted as u64;
        self.duplicates_suppressed += report.duplicates_suppressed as u64;
        self.withheld += report.withheld as u64;
        for (name, n) in &report.rule_runs {
            *self.rule_runs.entry(name.clone()).or_default() += n;
        }
        for (name, n) in &report.failed_rules {
            *self.rule_failures.entry(name.clone()).or_default() += n;
        }
        self.last_pass = Some(at);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_pass_duration = if self.passes == 1 {
            report.duration
        } else {
            let prev = self.avg_pass_duration.as_nanos() as f64;
            let cur = report.duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / self.passes as f64) as u64)
        };
    }

    pub fn record_failed_pass(&mut self) {
        self.failed_passes += 1;
    }
}
