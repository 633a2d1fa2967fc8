//! # Orchestration Types
//!
//! Run inputs (overrides and the effective configuration they resolve to) and the
//! structured outputs of a worker run: per-task [`TaskExecution`] entries, the
//! aggregated [`RunResult`] and the read-only [`StatusReport`].
//!
//! Everything here serializes as camelCase JSON for the HTTP trigger layer.

use crate::config::WorkerConfig;
use crate::constants::{report, worker};
use crate::gateway::CircuitBreakerState;
use crate::lock::{LockOutcome, LockStatus};
use crate::models::SavedSearchTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-run knobs supplied by the trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOverrides {
    pub scan_budget: Option<u32>,
    pub dry_run: Option<bool>,
}

impl RunOverrides {
    pub fn with_scan_budget(scan_budget: u32) -> Self {
        Self {
            scan_budget: Some(scan_budget),
            ..Self::default()
        }
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: Some(true),
            ..Self::default()
        }
    }
}

/// Configuration a single run actually uses, echoed back in [`RunResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveRunConfig {
    pub scan_budget: u32,
    pub dry_run: bool,
    pub live_calls_enabled: bool,
    pub max_deals_per_alert: usize,
}

impl EffectiveRunConfig {
    /// Apply `overrides` on top of `settings`, clamping the budget to
    /// `[1, min(max_scan_budget, MAX_SCAN_BUDGET)]`
    pub fn resolve(settings: &WorkerConfig, overrides: &RunOverrides) -> Self {
        let ceiling = settings
            .max_scan_budget
            .min(worker::MAX_SCAN_BUDGET)
            .max(1);
        Self {
            scan_budget: overrides
                .scan_budget
                .unwrap_or(settings.scan_budget)
                .clamp(1, ceiling),
            dry_run: overrides.dry_run.unwrap_or(settings.dry_run),
            live_calls_enabled: settings.live_calls_enabled,
            max_deals_per_alert: settings.max_deals_per_alert,
        }
    }

    /// Whether the run skips the outbound search entirely
    pub fn is_simulated(&self) -> bool {
        self.dry_run || !self.live_calls_enabled
    }
}

/// Outcome of processing one saved search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    /// `None` only for the synthetic worker-fatal entry
    pub task_id: Option<Uuid>,
    pub query: String,
    pub executed: bool,
    pub simulated_due_to_flag: bool,
    pub dry_run: bool,
    pub deals_found: usize,
    pub deals_above_threshold: usize,
    pub duplicates_suppressed: usize,
    pub new_deals: usize,
    pub alert_sent: bool,
    pub alerts_recorded: usize,
    pub circuit_open: bool,
    pub rescheduled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub skip_reason: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskExecution {
    pub fn for_task(task: &SavedSearchTask) -> Self {
        Self {
            task_id: Some(task.id),
            query: task.query_text.clone(),
            ..Self::default()
        }
    }

    /// Entry standing in for a failure that escaped the per-task loop
    pub fn worker_fatal(message: impl Into<String>) -> Self {
        Self {
            task_id: None,
            query: report::WORKER_FATAL_QUERY.to_string(),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_worker_fatal(&self) -> bool {
        self.task_id.is_none() && self.query == report::WORKER_FATAL_QUERY
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Due tasks at selection time, unbounded by the budget
    pub total_pending: u64,
    pub processed: usize,
    pub deferred: u64,
    /// Notifications delivered (one per task at most)
    pub alerts_sent: usize,
    pub deals_notified: usize,
    pub errors: usize,
    pub circuit_open_skips: usize,
    pub simulated: usize,
}

impl RunStats {
    pub fn aggregate(total_pending: u64, deferred: u64, executions: &[TaskExecution]) -> Self {
        let mut stats = Self {
            total_pending,
            deferred,
            ..Self::default()
        };
        for execution in executions {
            if execution.executed {
                stats.processed += 1;
            }
            if execution.alert_sent {
                stats.alerts_sent += 1;
                stats.deals_notified += execution.new_deals;
            }
            if execution.is_error() {
                stats.errors += 1;
            }
            if execution.circuit_open {
                stats.circuit_open_skips += 1;
            }
            if execution.simulated_due_to_flag {
                stats.simulated += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub key: String,
    pub ttl_seconds: u64,
    pub acquired: bool,
    /// Acquisition decided by the failure mode because the store was unreachable
    pub degraded: bool,
}

impl LockInfo {
    pub fn from_outcome(key: &str, ttl_seconds: u64, outcome: LockOutcome) -> Self {
        Self {
            key: key.to_string(),
            ttl_seconds,
            acquired: outcome.is_acquired(),
            degraded: matches!(
                outcome,
                LockOutcome::AcquiredDegraded | LockOutcome::RefusedDegraded
            ),
        }
    }
}

/// Structured result of [`crate::orchestration::RunOrchestrator::run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub config: EffectiveRunConfig,
    pub stats: RunStats,
    pub executions: Vec<TaskExecution>,
    pub budget_exhausted: bool,
    pub skipped_due_to_lock: bool,
    pub skipped_due_to_rate_limit: bool,
    pub next_allowed_in_seconds: Option<u64>,
    pub lock_info: Option<LockInfo>,
    pub error: Option<String>,
}

impl RunResult {
    /// Empty result for `run_id`; the orchestrator fills it in as the run progresses
    pub fn started(run_id: String, started_at: DateTime<Utc>, config: EffectiveRunConfig) -> Self {
        Self {
            success: false,
            run_id,
            started_at,
            completed_at: started_at,
            duration_ms: 0,
            config,
            stats: RunStats::default(),
            executions: Vec::new(),
            budget_exhausted: false,
            skipped_due_to_lock: false,
            skipped_due_to_rate_limit: false,
            next_allowed_in_seconds: None,
            lock_info: None,
            error: None,
        }
    }

    pub fn worker_fatal(&self) -> Option<&TaskExecution> {
        self.executions.iter().find(|e| e.is_worker_fatal())
    }
}

/// Read-only operational view; never consulted for scheduling decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub store_ready: bool,
    pub notifier_ready: bool,
    pub live_calls_enabled: bool,
    /// `None` when the store could not be queried
    pub alert_enabled_tasks: Option<u64>,
    pub due_tasks: Option<u64>,
    pub scan_budget: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub lock: LockStatus,
    pub circuit: CircuitBreakerState,
    pub queued_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_worker_defaults() {
        let config = EffectiveRunConfig::resolve(&WorkerConfig::default(), &RunOverrides::default());
        assert_eq!(config.scan_budget, 20);
        assert!(!config.dry_run);
        assert!(config.live_calls_enabled);
        assert!(!config.is_simulated());
    }

    #[test]
    fn test_resolve_clamps_budget() {
        let worker = WorkerConfig::default();
        let high = EffectiveRunConfig::resolve(&worker, &RunOverrides::with_scan_budget(500));
        assert_eq!(high.scan_budget, 50);
        let zero = EffectiveRunConfig::resolve(&worker, &RunOverrides::with_scan_budget(0));
        assert_eq!(zero.scan_budget, 1);
    }

    #[test]
    fn test_resolve_enforces_hard_cap_on_unvalidated_config() {
        let worker = WorkerConfig {
            max_scan_budget: 500,
            scan_budget: 200,
            ..WorkerConfig::default()
        };
        let config = EffectiveRunConfig::resolve(&worker, &RunOverrides::default());
        assert_eq!(config.scan_budget, 50);
        let requested = EffectiveRunConfig::resolve(&worker, &RunOverrides::with_scan_budget(400));
        assert_eq!(requested.scan_budget, 50);
    }

    #[test]
    fn test_dry_run_override_simulates() {
        let config = EffectiveRunConfig::resolve(&WorkerConfig::default(), &RunOverrides::dry_run());
        assert!(config.dry_run);
        assert!(config.is_simulated());
    }

    #[test]
    fn test_stats_aggregation() {
        let ok = TaskExecution {
            task_id: Some(Uuid::new_v4()),
            executed: true,
            alert_sent: true,
            new_deals: 2,
            ..TaskExecution::default()
        };
        let open = TaskExecution {
            task_id: Some(Uuid::new_v4()),
            executed: true,
            circuit_open: true,
            ..TaskExecution::default()
        };
        let failed = TaskExecution {
            task_id: Some(Uuid::new_v4()),
            executed: true,
            error: Some("boom".to_string()),
            ..TaskExecution::default()
        };
        let fatal = TaskExecution::worker_fatal("panicked");

        let stats = RunStats::aggregate(7, 3, &[ok, open, failed, fatal]);
        assert_eq!(stats.total_pending, 7);
        assert_eq!(stats.deferred, 3);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.alerts_sent, 1);
        assert_eq!(stats.deals_notified, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.circuit_open_skips, 1);
    }

    #[test]
    fn test_run_result_serializes_camel_case() {
        let result = RunResult::started(
            "run-1".to_string(),
            Utc::now(),
            EffectiveRunConfig::resolve(&WorkerConfig::default(), &RunOverrides::default()),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("skippedDueToLock").is_some());
        assert!(json.get("budgetExhausted").is_some());
        assert_eq!(json["config"]["scanBudget"], 20);
    }
}
