//! Tenant poll loop.
//!
//! The [`Scheduler`] runs one evaluation pass immediately and then one per
//! poll interval until its cancellation token fires. A pass lists the
//! tenant's entities, walks them in fixed-size batches and hands each one to
//! the [`Orchestrator`](crate::orchestrator::Orchestrator). Ticks that come
//! due while a pass is still running are skipped, not queued.

mod core;
mod metrics;


pub use self::core::Scheduler;
pub use self::metrics::{PassMetrics, PassReport};
