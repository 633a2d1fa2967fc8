//! Process-local task store.
//!
//! Same semantics as the PostgreSQL store, including the dedup contract, but the
//! data lives only as long as the process. `set_available(false)` makes every call
//! fail with [`DealwatchError::StoreUnavailable`] to exercise outage handling.

use super::TaskStore;
use crate::error::{DealwatchError, Result};
use crate::models::{AlertRecord, NewAlertRecord, NewSavedSearchTask, SavedSearchTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, SavedSearchTask>>,
    alerts: Mutex<HashMap<(Uuid, String), AlertRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            alerts: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Store a fully-formed row as-is, bypassing creation defaults
    pub fn insert_task(&self, task: SavedSearchTask) {
        self.tasks.lock().insert(task.id, task);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DealwatchError::StoreUnavailable(
                "in-memory task store marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn ping(&self) -> Result<()> {
        self.ensure_available()
    }

    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<SavedSearchTask>> {
        self.ensure_available()?;
        let mut due: Vec<SavedSearchTask> = self
            .tasks
            .lock()
            .values()
            .filter(|task| task.is_due(now))
            .cloned()
            .collect();
        // Oldest slot first, id breaks ties
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then(a.id.cmp(&b.id)));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn count_due(&self, now: DateTime<Utc>) -> Result<u64> {
        self.ensure_available()?;
        Ok(self.tasks.lock().values().filter(|t| t.is_due(now)).count() as u64)
    }

    async fn count_alert_enabled(&self) -> Result<u64> {
        self.ensure_available()?;
        Ok(self.tasks.lock().values().filter(|t| t.alert_enabled).count() as u64)
    }

    async fn reschedule(
        &self,
        task_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_available()?;
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(&task_id) {
            Some(task) => {
                task.last_run_at = Some(last_run_at);
                task.next_run_at = Some(next_run_at);
                task.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_alert(&self, task_id: Uuid, item_id: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self
            .alerts
            .lock()
            .contains_key(&(task_id, item_id.to_string())))
    }

    async fn record_alert(&self, record: NewAlertRecord, sent_at: DateTime<Utc>) -> Result<bool> {
        self.ensure_available()?;
        let key = (record.task_id, record.item_id.clone());
        let mut alerts = self.alerts.lock();
        if alerts.contains_key(&key) {
            return Ok(false);
        }
        alerts.insert(key, AlertRecord::from_new(record, sent_at));
        Ok(true)
    }

    async fn alerts_for_task(&self, task_id: Uuid) -> Result<Vec<AlertRecord>> {
        self.ensure_available()?;
        let mut records: Vec<AlertRecord> = self
            .alerts
            .lock()
            .values()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.sent_at);
        Ok(records)
    }

    async fn create_task(&self, new_task: NewSavedSearchTask) -> Result<SavedSearchTask> {
        self.ensure_available()?;
        let task = SavedSearchTask::from_new(new_task, Utc::now());
        self.tasks.lock().insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, task_id: Uuid) -> Result<Option<SavedSearchTask>> {
        self.ensure_available()?;
        Ok(self.tasks.lock().get(&task_id).cloned())
    }

    async fn set_alert_enabled(
        &self,
        task_id: Uuid,
        enabled: bool,
    ) -> Result<Option<SavedSearchTask>> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tasks = self.tasks.lock();
        Ok(tasks.get_mut(&task_id).map(|task| {
            if enabled && !task.alert_enabled {
                task.next_run_at = Some(now);
            }
            task.alert_enabled = enabled;
            task.updated_at = now;
            task.clone()
        }))
    }
}
