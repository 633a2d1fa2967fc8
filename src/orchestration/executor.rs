//! # Task Executor
//!
//! Processes one saved search end to end. The step order is fixed:
//!
//! 1. Simulate (no outbound call) when live calls are disabled or the run is a dry run.
//! 2. Otherwise search through the [`ApiGate`].
//! 3. Reschedule: `last_run_at = now`, `next_run_at = now + frequency`. This happens
//!    whatever the search outcome was, so a failing task cannot be re-selected in a
//!    tight loop.
//! 4. Keep candidates scoring at or above the task's minimum score.
//! 5. Drop candidates already alerted for this task (and repeats within the batch).
//! 6. Keep at most `max_deals_per_alert`, best score first.
//! 7. Send one notification, then record every notified item in alert history.
//!
//! Notification happens before the history write. If the write fails after a
//! successful send, the next run will notify the same items again.
//!
//! [`TaskExecutor::process`] never returns an error: failures are folded into the
//! returned [`TaskExecution`].

use super::types::{EffectiveRunConfig, TaskExecution};
use crate::error::{DealwatchError, Result};
use crate::gateway::ApiGate;
use crate::logging::{log_error, log_task_operation};
use crate::marketplace::{MarketplaceSearch, SearchRequest, SearchResponse};
use crate::models::{DealCandidate, NewAlertRecord, SavedSearchTask};
use crate::notify::{DealAlert, Notifier};
use crate::store::TaskStore;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    gate: Arc<ApiGate>,
    marketplace: Arc<dyn MarketplaceSearch>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gate: Arc<ApiGate>,
        marketplace: Arc<dyn MarketplaceSearch>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            gate,
            marketplace,
            notifier,
        }
    }

    #[instrument(skip(self, task, config), fields(task_id = %task.id))]
    pub async fn process(&self, task: &SavedSearchTask, config: &EffectiveRunConfig) -> TaskExecution {
        let timer = Instant::now();
        let mut execution = TaskExecution::for_task(task);
        execution.dry_run = config.dry_run;

        let search = if config.is_simulated() {
            None
        } else {
            let request = SearchRequest::from(task);
            let marketplace = Arc::clone(&self.marketplace);
            Some(
                self.gate
                    .submit(|| async move { marketplace.search(&request).await })
                    .await,
            )
        };

        if let Err(e) = self.reschedule(task, &mut execution).await {
            log_error(
                "TaskExecutor",
                "reschedule",
                &e.to_string(),
                Some(&task.id.to_string()),
            );
            execution.error = Some(format!("reschedule failed: {e}"));
            return finish(execution, timer);
        }
        execution.executed = true;

        match search {
            None => {
                execution.simulated_due_to_flag = true;
                execution.skip_reason = Some(if config.dry_run {
                    "dry run".to_string()
                } else {
                    "live provider calls disabled".to_string()
                });
            }
            Some(Err(e)) if e.is_circuit_open() => {
                debug!(error = %e, "Search skipped while provider circuit is open");
                execution.circuit_open = true;
                execution.skip_reason = Some(e.to_string());
            }
            Some(Err(e)) => {
                warn!(error = %e, "Marketplace search failed");
                execution.error = Some(e.to_string());
            }
            Some(Ok(response)) => {
                if let Err(e) = self.evaluate(task, response, config, &mut execution).await {
                    log_error(
                        "TaskExecutor",
                        "evaluate",
                        &e.to_string(),
                        Some(&task.id.to_string()),
                    );
                    execution.error = Some(e.to_string());
                }
            }
        }

        let execution = finish(execution, timer);
        log_task_operation(
            "process",
            &task.id.to_string(),
            Some(&task.query_text),
            if execution.is_error() { "error" } else { "ok" },
            Some(&format!(
                "found={} above_threshold={} new={} alert_sent={}",
                execution.deals_found,
                execution.deals_above_threshold,
                execution.new_deals,
                execution.alert_sent
            )),
        );
        execution
    }

    async fn reschedule(&self, task: &SavedSearchTask, execution: &mut TaskExecution) -> Result<()> {
        let ran_at = Utc::now();
        let next_run_at = task.next_run_after(ran_at);
        let found = self.store.reschedule(task.id, ran_at, next_run_at).await?;
        if !found {
            warn!(task_id = %task.id, "Saved search vanished before it could be rescheduled");
        }
        execution.rescheduled = found;
        execution.next_run_at = Some(next_run_at);
        Ok(())
    }

    async fn evaluate(
        &self,
        task: &SavedSearchTask,
        response: SearchResponse,
        config: &EffectiveRunConfig,
        execution: &mut TaskExecution,
    ) -> Result<()> {
        execution.deals_found = response.candidates.len();

        let qualifying: Vec<DealCandidate> = response
            .candidates
            .into_iter()
            .filter(|deal| task.accepts_score(deal.deal_score))
            .collect();
        execution.deals_above_threshold = qualifying.len();

        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(qualifying.len());
        for deal in qualifying {
            if !seen.insert(deal.item_id.clone()) {
                execution.duplicates_suppressed += 1;
                continue;
            }
            if self.store.has_alert(task.id, &deal.item_id).await? {
                execution.duplicates_suppressed += 1;
                continue;
            }
            fresh.push(deal);
        }
        execution.new_deals = fresh.len();

        if fresh.is_empty() {
            return Ok(());
        }

        let deals = select_best(fresh, config.max_deals_per_alert);
        let alert = DealAlert::new(task, deals);
        self.notifier
            .send(&alert)
            .await
            .map_err(|e| DealwatchError::NotificationError(format!("{e:#}")))?;
        execution.alert_sent = true;

        let sent_at = Utc::now();
        for deal in &alert.deals {
            if self
                .store
                .record_alert(NewAlertRecord::deal_alert(task.id, deal), sent_at)
                .await?
            {
                execution.alerts_recorded += 1;
            }
        }
        execution.new_deals = alert.deals.len();
        Ok(())
    }
}

/// Highest scores first, keeping provider order among equal scores
fn select_best(mut deals: Vec<DealCandidate>, limit: usize) -> Vec<DealCandidate> {
    deals.sort_by(|a, b| {
        b.deal_score
            .partial_cmp(&a.deal_score)
            .unwrap_or(Ordering::Equal)
    });
    deals.truncate(limit);
    deals
}

fn finish(mut execution: TaskExecution, timer: Instant) -> TaskExecution {
    execution.duration_ms = timer.elapsed().as_millis() as u64;
    execution
}
