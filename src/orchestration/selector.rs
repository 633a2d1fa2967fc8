//! # Task Selector
//!
//! Picks the due saved searches for one run: enabled, `next_run_at <= now`,
//! oldest-due first, truncated to the scan budget. The ordering is what keeps the
//! worker fair: a task that has waited longest is never starved by newer ones,
//! and anything left over is simply first in line next run.

use crate::error::Result;
use crate::models::SavedSearchTask;
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Tasks chosen for a run plus the backlog figures reported alongside them
#[derive(Debug, Clone)]
pub struct Selection {
    pub tasks: Vec<SavedSearchTask>,
    pub total_due: u64,
    pub deferred: u64,
    pub scan_budget: u32,
}

impl Selection {
    /// The budget, not the backlog, bounded this run
    pub fn budget_exhausted(&self) -> bool {
        self.total_due > u64::from(self.scan_budget)
    }
}

pub fn deferred_count(total_due: u64, scan_budget: u32) -> u64 {
    total_due.saturating_sub(u64::from(scan_budget))
}

#[derive(Clone)]
pub struct TaskSelector {
    store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for TaskSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSelector").finish_non_exhaustive()
    }
}

impl TaskSelector {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn select_due(&self, scan_budget: u32) -> Result<Vec<SavedSearchTask>> {
        self.store.select_due(Utc::now(), scan_budget).await
    }

    /// Unbounded; observability only
    pub async fn count_due(&self) -> Result<u64> {
        self.store.count_due(Utc::now()).await
    }

    /// Count and select against the same `now`. The two reads are not in one
    /// transaction, so `deferred` is approximate under concurrent writes.
    #[instrument(skip(self))]
    pub async fn select(&self, scan_budget: u32) -> Result<Selection> {
        self.select_at(Utc::now(), scan_budget).await
    }

    pub async fn select_at(&self, now: DateTime<Utc>, scan_budget: u32) -> Result<Selection> {
        let total_due = self.store.count_due(now).await?;
        let tasks = self.store.select_due(now, scan_budget).await?;
        let deferred = deferred_count(total_due, scan_budget);

        debug!(
            total_due,
            selected = tasks.len(),
            deferred,
            scan_budget,
            "Selected due saved searches"
        );

        Ok(Selection {
            tasks,
            total_due,
            deferred,
            scan_budget,
        })
    }
}
