//! # Run Orchestrator
//!
//! Entry point for one worker run. A run goes through, in order:
//!
//! 1. resolve the effective configuration from [`RunOverrides`],
//! 2. preflight: the task store must answer, otherwise the run aborts,
//! 3. the process-local minimum spacing between runs,
//! 4. the distributed lock (contention is an expected, successful outcome),
//! 5. due-task selection bounded by the scan budget,
//! 6. a single sequential pass over the selected tasks,
//! 7. aggregation into a [`RunResult`].
//!
//! `run` never returns an error and never panics out: a panic escaping the task
//! loop is caught and reported as a synthetic `worker_fatal` execution entry.

use super::executor::TaskExecutor;
use super::selector::TaskSelector;
use super::types::{
    EffectiveRunConfig, LockInfo, RunOverrides, RunResult, RunStats, StatusReport, TaskExecution,
};
use crate::config::{EngineConfig, WorkerConfig};
use crate::error::Result;
use crate::gateway::ApiGate;
use crate::kv::{InMemoryKeyValueStore, KeyValueStore, RedisKeyValueStore};
use crate::lock::{DistributedLock, LockOutcome};
use crate::logging::{log_error, log_run_operation};
use crate::marketplace::MarketplaceSearch;
use crate::notify::Notifier;
use crate::store::{PgTaskStore, TaskStore};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct LastRun {
    at: tokio::time::Instant,
    wall_clock: DateTime<Utc>,
}

pub struct RunOrchestrator {
    store: Arc<dyn TaskStore>,
    lock: DistributedLock,
    selector: TaskSelector,
    executor: TaskExecutor,
    gate: Arc<ApiGate>,
    notifier: Arc<dyn Notifier>,
    worker: WorkerConfig,
    last_run: Mutex<Option<LastRun>>,
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("lock", &self.lock)
            .field("gate", &self.gate)
            .field("worker", &self.worker)
            .field("last_run", &*self.last_run.lock())
            .finish_non_exhaustive()
    }
}

impl RunOrchestrator {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn TaskStore>,
        kv: Arc<dyn KeyValueStore>,
        gate: Arc<ApiGate>,
        marketplace: Arc<dyn MarketplaceSearch>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            lock: DistributedLock::new(kv, &config.lock),
            selector: TaskSelector::new(Arc::clone(&store)),
            executor: TaskExecutor::new(
                Arc::clone(&store),
                Arc::clone(&gate),
                marketplace,
                Arc::clone(&notifier),
            ),
            store,
            gate,
            notifier,
            worker: config.worker.clone(),
            last_run: Mutex::new(None),
        }
    }

    /// Wire the production backends: PostgreSQL task store, Redis when configured
    /// (in-memory key-value fallback otherwise) and a gate sharing breaker state
    /// through that key-value store.
    pub fn from_config(
        config: &EngineConfig,
        marketplace: Arc<dyn MarketplaceSearch>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::connect_lazy(&config.database)?);
        let kv: Arc<dyn KeyValueStore> = match RedisKeyValueStore::from_config(&config.redis)? {
            Some(redis) => Arc::new(redis),
            None => {
                warn!("No redis.url configured - worker lock and circuit state are per-instance only");
                Arc::new(InMemoryKeyValueStore::new())
            }
        };
        let gate = Arc::new(ApiGate::with_shared_state(&config.gateway, Arc::clone(&kv)));

        Ok(Self::new(config, store, kv, gate, marketplace, notifier))
    }

    pub fn gate(&self) -> &ApiGate {
        &self.gate
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        (*self.last_run.lock()).map(|last| last.wall_clock)
    }

    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, overrides: RunOverrides) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        let timer = Instant::now();
        let config = EffectiveRunConfig::resolve(&self.worker, &overrides);
        let mut result = RunResult::started(run_id.clone(), Utc::now(), config);

        log_run_operation(
            "run",
            &run_id,
            "started",
            Some(&format!(
                "scan_budget={} dry_run={} live_calls_enabled={}",
                config.scan_budget, config.dry_run, config.live_calls_enabled
            )),
        );

        if let Err(e) = self.store.ping().await {
            log_error("RunOrchestrator", "preflight", &e.to_string(), Some(&run_id));
            result.error = Some(format!("preflight failed: {e}"));
            return complete(result, timer, "aborted");
        }

        if let Some(wait) = self.claim_run_slot() {
            info!(wait_ms = wait.as_millis() as u64, "⏳ Run requested too soon after the previous one");
            result.success = true;
            result.skipped_due_to_rate_limit = true;
            result.next_allowed_in_seconds = Some(ceil_seconds(wait));
            return complete(result, timer, "skipped_rate_limit");
        }

        let outcome = self.lock.try_acquire(&run_id).await;
        result.lock_info = Some(LockInfo::from_outcome(
            self.lock.key(),
            self.lock.ttl_seconds(),
            outcome,
        ));
        match outcome {
            LockOutcome::Contended => {
                result.success = true;
                result.skipped_due_to_lock = true;
                return complete(result, timer, "skipped_lock");
            }
            LockOutcome::RefusedDegraded => {
                result.skipped_due_to_lock = true;
                result.error = Some("lock store unreachable and lock is fail-closed".to_string());
                return complete(result, timer, "skipped_lock");
            }
            LockOutcome::Acquired | LockOutcome::AcquiredDegraded => {}
        }

        let selection = match self.selector.select(config.scan_budget).await {
            Ok(selection) => selection,
            Err(e) => {
                log_error("RunOrchestrator", "select", &e.to_string(), Some(&run_id));
                result.error = Some(format!("task selection failed: {e}"));
                return complete(result, timer, "aborted");
            }
        };

        let mut executions: Vec<TaskExecution> = Vec::with_capacity(selection.tasks.len());
        let pass = AssertUnwindSafe(async {
            for task in &selection.tasks {
                let execution = self.executor.process(task, &config).await;
                executions.push(execution);
            }
        })
        .catch_unwind()
        .await;

        let fatal = match pass {
            Ok(()) => false,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log_error("RunOrchestrator", "task_loop", &message, Some(&run_id));
                executions.push(TaskExecution::worker_fatal(format!("worker fatal: {message}")));
                true
            }
        };

        result.stats = RunStats::aggregate(selection.total_due, selection.deferred, &executions);
        result.budget_exhausted = selection.budget_exhausted();
        result.executions = executions;
        result.success = !fatal;
        if fatal {
            result.error = Some("worker fatal error during task processing".to_string());
        }

        let status = if fatal { "fatal" } else { "completed" };
        complete(result, timer, status)
    }

    /// Read-only view for operators; never feeds back into scheduling
    pub async fn status(&self) -> StatusReport {
        let store_ready = self.store.ping().await.is_ok();
        let (alert_enabled_tasks, due_tasks) = if store_ready {
            (
                self.store.count_alert_enabled().await.ok(),
                self.selector.count_due().await.ok(),
            )
        } else {
            (None, None)
        };

        StatusReport {
            store_ready,
            notifier_ready: self.notifier.is_ready(),
            live_calls_enabled: self.worker.live_calls_enabled,
            alert_enabled_tasks,
            due_tasks,
            scan_budget: self.worker.scan_budget,
            last_run_at: self.last_run_at(),
            lock: self.lock.status().await,
            circuit: self.gate.breaker().current_state().await,
            queued_calls: self.gate.queue().waiting(),
        }
    }

    /// Record this run as the latest, or report how long until one is allowed
    fn claim_run_slot(&self) -> Option<Duration> {
        let min_interval = self.worker.min_run_interval();
        let now = tokio::time::Instant::now();
        let mut last_run = self.last_run.lock();

        if let Some(last) = *last_run {
            let elapsed = now.saturating_duration_since(last.at);
            if elapsed < min_interval {
                return Some(min_interval - elapsed);
            }
        }

        *last_run = Some(LastRun {
            at: now,
            wall_clock: Utc::now(),
        });
        None
    }
}

fn complete(mut result: RunResult, timer: Instant, status: &str) -> RunResult {
    result.completed_at = Utc::now();
    result.duration_ms = timer.elapsed().as_millis() as u64;
    log_run_operation(
        "run",
        &result.run_id,
        status,
        Some(&format!(
            "processed={} alerts_sent={} errors={} deferred={} duration_ms={}",
            result.stats.processed,
            result.stats.alerts_sent,
            result.stats.errors,
            result.stats.deferred,
            result.duration_ms
        )),
    );
    result
}

fn ceil_seconds(wait: Duration) -> u64 {
    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
