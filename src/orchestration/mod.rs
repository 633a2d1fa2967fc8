//! # Orchestration
//!
//! The scheduled run pipeline:
//!
//! - [`TaskSelector`] picks due saved searches within the scan budget
//! - [`TaskExecutor`] processes one saved search (search, reschedule, filter, dedup, notify)
//! - [`RunOrchestrator`] wraps a run with preflight, spacing, the distributed lock and
//!   result aggregation
//!
//! ```rust,no_run
//! use dealwatch_core::orchestration::{RunOrchestrator, RunOverrides};
//!
//! # async fn example(orchestrator: RunOrchestrator) {
//! let result = orchestrator.run(RunOverrides::with_scan_budget(10)).await;
//! println!("processed {} tasks, {} deferred", result.stats.processed, result.stats.deferred);
//! # }
//! ```

pub mod executor;
pub mod orchestrator;
pub mod selector;
pub mod types;

pub use executor::TaskExecutor;
pub use orchestrator::RunOrchestrator;
pub use selector::{deferred_count, Selection, TaskSelector};
pub use types::{
    EffectiveRunConfig, LockInfo, RunOverrides, RunResult, RunStats, StatusReport, TaskExecution,
};
