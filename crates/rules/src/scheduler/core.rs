//! [`Scheduler`]: drives evaluation passes for one tenant.

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use carewatch_core::{EntityKind, MonitoredEntity};

use crate::context::TenantContext;
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;

use super::metrics::{PassMetrics, PassReport};

pub struct Scheduler {
    ctx: TenantContext,
    orchestrator: Orchestrator,
    metrics: PassMetrics,
}

impl Scheduler {
    pub fn new(ctx: TenantContext, orchestrator: Orchestrator) -> Self {
        Self {
            ctx,
            orchestrator,
            metrics: PassMetrics::default(),
        }
    }

    pub fn context(&self) -> &TenantContext {
        &self.ctx
    }

    /// Totals across every pass run so far.
    pub fn metrics(&self) -> &PassMetrics {
        &self.metrics
    }

    /// Run passes until `cancel` fires. The first pass starts immediately.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.ctx.engine.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tenant_id = %self.ctx.tenant_id,
            interval_secs = self.ctx.engine.poll_interval_secs,
            batch_size = self.ctx.engine.batch_size,
            rules = ?self.orchestrator.rules().names(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_pass(&cancel).await {
                warn!(tenant_id = %self.ctx.tenant_id, error = %e, "evaluation pass aborted");
            }
        }

        info!(
            tenant_id = %self.ctx.tenant_id,
            passes = self.metrics.passes,
            alarms = self.metrics.alarms_persisted,
            "scheduler stopped"
        );
    }

    pub async fn run_pass(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<PassReport, EngineError> {
        self.run_pass_at(Utc::now(), cancel).await
    }

    /// One pass with an explicit evaluation time.
    ///
    /// Fails only when the entity list cannot be obtained; everything after
    /// that is isolated per entity.
    pub async fn run_pass_at(
        &mut self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassReport, EngineError> {
        let started = Instant::now();

        let (entities, used_fallback) = match self.list_entities().await {
            Ok(listed) => listed,
            Err(e) => {
                self.metrics.record_failed_pass();
                return Err(e);
            }
        };

        let mut report = PassReport {
            entities: entities.len(),
            used_fallback,
            ..Default::default()
        };

        let batch_size = self.ctx.engine.batch_size.max(1);
        'batches: for (batch_no, batch) in entities.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            for entity in batch {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'batches;
                }
                match self.orchestrator.evaluate(&self.ctx, entity, now).await {
                    Ok(outcome) => report.record_entity(&outcome),
                    Err(e) => {
                        warn!(
                            entity_id = %entity.id,
                            batch = batch_no,
                            error = %e,
                            "entity evaluation failed"
                        );
                        report.entity_failures += 1;
                    }
                }
            }
        }

        report.duration = started.elapsed();
        self.metrics.record_pass(&report, now);
        report.log(&self.ctx.tenant_id);
        Ok(report)
    }

    /// Catalog listing, or the cache-key scan when the catalog is down and
    /// the fallback is enabled. The flag reports which one was used.
    async fn list_entities(&self) -> Result<(Vec<MonitoredEntity>, bool), EngineError> {
        let err = match self.ctx.catalog.list_entities(&self.ctx.tenant_id).await {
            Ok(entities) => return Ok((entities, false)),
            Err(e) => e,
        };

        if !self.ctx.engine.catalog_fallback_scan {
            return Err(EngineError::Catalog(err.to_string()));
        }

        warn!(
            tenant_id = %self.ctx.tenant_id,
            error = %err,
            "entity listing failed, scanning cache keys"
        );
        let entities = self
            .ctx
            .gateway
            .scan_entity_ids()
            .await?
            .into_iter()
            .map(|id| MonitoredEntity::new(id, self.ctx.tenant_id.clone(), EntityKind::Unknown))
            .collect();
        Ok((entities, true))
    }
}
