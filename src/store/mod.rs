//! # Task Store
//!
//! Data access for saved-search tasks (schedule state) and alert history (dedup log).
//! Pure persistence: no scheduling policy lives here beyond the query shapes the
//! selector and executor rely on.
//!
//! Two implementations ship with the crate:
//!
//! - [`PgTaskStore`] - PostgreSQL via SQLx, the production backend
//! - [`InMemoryTaskStore`] - process-local maps for tests and local development

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{AlertRecord, NewAlertRecord, NewSavedSearchTask, SavedSearchTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Cheap reachability probe used by run preflight and status
    async fn ping(&self) -> Result<()>;

    /// Enabled tasks with `next_run_at <= now`, oldest-due first, at most `limit` rows
    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<SavedSearchTask>>;

    /// Unbounded count of the tasks [`TaskStore::select_due`] would consider
    async fn count_due(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn count_alert_enabled(&self) -> Result<u64>;

    /// Persist schedule state after a processing attempt. Returns false when the
    /// task no longer exists.
    async fn reschedule(
        &self,
        task_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn has_alert(&self, task_id: Uuid, item_id: &str) -> Result<bool>;

    /// Append a dedup entry. Returns false if `(task_id, item_id)` was already recorded.
    async fn record_alert(&self, record: NewAlertRecord, sent_at: DateTime<Utc>) -> Result<bool>;

    async fn alerts_for_task(&self, task_id: Uuid) -> Result<Vec<AlertRecord>>;

    /// Insert a saved search, eligible for the next run
    async fn create_task(&self, new_task: NewSavedSearchTask) -> Result<SavedSearchTask>;

    async fn find_task(&self, task_id: Uuid) -> Result<Option<SavedSearchTask>>;

    /// Toggle alerting. A false -> true transition makes the task due immediately.
    async fn set_alert_enabled(
        &self,
        task_id: Uuid,
        enabled: bool,
    ) -> Result<Option<SavedSearchTask>>;
}
