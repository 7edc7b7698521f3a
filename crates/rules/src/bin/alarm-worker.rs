//! alarm-worker — runs the alarm evaluation loop for one tenant.
//!
//! Reads fused readings from the cache, evaluates the detection rules per
//! monitored entity, persists new alarms to PostgreSQL and mirrors active
//! alarms back into the cache. Stops on SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use carewatch_cache::{KeyLayout, KvStore, RedisKv};
use carewatch_core::config::{load_dotenv, LogConfig};
use carewatch_core::Config;
use carewatch_rules::{Orchestrator, RuleSet, Scheduler, TenantContext};
use carewatch_storage::{PgAlarmStore, PgEntityCatalog};

// ── CLI ─────────────────────────────────────────────────────────────

/// Alarm evaluation worker.
#[derive(Parser, Debug)]
#[command(name = "alarm-worker", version, about)]
struct Cli {
    /// Run a single evaluation pass and exit.
    #[arg(long, env = "ALARM_WORKER_ONCE")]
    once: bool,

    /// Apply the bundled SQL migrations before starting.
    #[arg(long, env = "RUN_MIGRATIONS")]
    run_migrations: bool,
}

// ── main ────────────────────────────────────────────────────────────

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    if log.is_json() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().init();
            error!(error = %e, "invalid configuration");
            return Err(e).context("failed to load configuration");
        }
    };
    init_logging(&config.log);
    config.log_summary();

    let pool = carewatch_storage::connect(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    if cli.run_migrations {
        carewatch_storage::run_migrations(&pool)
            .await
            .context("failed to apply migrations")?;
    }

    let kv = RedisKv::connect(&config.cache)
        .await
        .context("failed to connect to cache")?;
    info!(backend = kv.backend_name(), "cache connected");

    let ctx = TenantContext::new(
        config.tenant_id.clone(),
        Arc::new(kv),
        KeyLayout::new(config.keys.clone()),
        Arc::new(PgAlarmStore::new(pool.clone())),
        Arc::new(PgEntityCatalog::new(pool.clone())),
        config.engine.clone(),
    );
    let mut scheduler = Scheduler::new(ctx, Orchestrator::new(RuleSet::standard(&config.rules)));

    let token = CancellationToken::new();

    if cli.once {
        let report = scheduler.run_pass(&token).await?;
        info!(alarms = report.alarms_persisted, "single pass finished");
    } else {
        let signal_token = token.clone();
        tokio::spawn(async move {
            os_signal().await;
            info!("shutdown signal received");
            signal_token.cancel();
        });
        scheduler.run(token).await;
    }

    pool.close().await;
    info!("alarm-worker exited cleanly");
    Ok(())
}

async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}
