//! Alarm evaluation engine.
//!
//! This crate provides:
//! - Stateful detection rules (bed exit, sensor reliability, bathroom standing,
//!   sudden disappearance) behind the [`Rule`] trait
//! - Typed, TTL-bounded rule state over the shared cache
//! - The alarm builder and the per-entity orchestrator with dedup
//! - The per-tenant poll scheduler and its pass metrics

pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod rule;
pub mod rules;
pub mod scheduler;
pub mod state;

pub use builder::AlarmBuilder;
pub use context::TenantContext;
pub use error::{EngineError, RuleError};
pub use orchestrator::{EntityOutcome, Orchestrator};
pub use rule::{RaisedAlarm, Rule, RuleSet};
pub use scheduler::{PassMetrics, PassReport, Scheduler};
pub use state::{RuleState, RuleStateStore};
