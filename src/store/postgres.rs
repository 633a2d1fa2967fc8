//! PostgreSQL task store.
//!
//! Uses runtime-checked queries so the crate builds without a live database. The
//! dedup contract is enforced by the unique `(task_id, item_id)` index; inserts use
//! `ON CONFLICT DO NOTHING` and report whether a row was written.

use super::TaskStore;
use crate::config::DatabaseConfig;
use crate::error::{DealwatchError, Result};
use crate::models::{
    clamp_minimum_score, clamp_run_frequency, AlertRecord, NewAlertRecord, NewSavedSearchTask,
    SavedSearchTask,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, owner_id, query_text, filter_set, alert_enabled, minimum_score, \
     run_frequency_minutes, last_run_at, next_run_at, created_at, updated_at";

const DUE_PREDICATE: &str = "alert_enabled AND next_run_at <= $1";

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect lazily; the first query (normally the run preflight) surfaces failures
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy(&config.url)
            .map_err(|e| DealwatchError::ConfigurationError(format!("Invalid database url: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DealwatchError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("Alert tables migrated");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DealwatchError {
    move |e| {
        error!(operation, error = %e, "Task store operation failed");
        DealwatchError::from(e)
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DealwatchError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<SavedSearchTask>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM saved_searches WHERE {DUE_PREDICATE} \
             ORDER BY next_run_at ASC, id ASC LIMIT $2"
        );

        let tasks = sqlx::query_as::<_, SavedSearchTask>(&query)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("select_due"))?;

        debug!(selected = tasks.len(), "Selected due saved searches");
        Ok(tasks)
    }

    async fn count_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM saved_searches WHERE {DUE_PREDICATE}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count_due"))?;
        Ok(count.max(0) as u64)
    }

    async fn count_alert_enabled(&self) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM saved_searches WHERE alert_enabled")
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count_alert_enabled"))?;
        Ok(count.max(0) as u64)
    }

    async fn reschedule(
        &self,
        task_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE saved_searches SET last_run_at = $2, next_run_at = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(task_id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("reschedule"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_alert(&self, task_id: Uuid, item_id: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM alert_history WHERE task_id = $1 AND item_id = $2)",
        )
        .bind(task_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("has_alert"))?;
        Ok(exists)
    }

    async fn record_alert(&self, record: NewAlertRecord, sent_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO alert_history (id, task_id, item_id, deal_score, alert_type, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (task_id, item_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(record.task_id)
        .bind(&record.item_id)
        .bind(record.deal_score)
        .bind(&record.alert_type)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("record_alert"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn alerts_for_task(&self, task_id: Uuid) -> Result<Vec<AlertRecord>> {
        sqlx::query_as::<_, AlertRecord>(
            "SELECT id, task_id, item_id, deal_score, alert_type, sent_at FROM alert_history \
             WHERE task_id = $1 ORDER BY sent_at ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("alerts_for_task"))
    }

    async fn create_task(&self, new_task: NewSavedSearchTask) -> Result<SavedSearchTask> {
        let task = SavedSearchTask::from_new(new_task, Utc::now());
        let query = format!(
            "INSERT INTO saved_searches ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {TASK_COLUMNS}"
        );

        sqlx::query_as::<_, SavedSearchTask>(&query)
            .bind(task.id)
            .bind(&task.owner_id)
            .bind(&task.query_text)
            .bind(Json(&task.filter_set))
            .bind(task.alert_enabled)
            .bind(clamp_minimum_score(task.minimum_score))
            .bind(clamp_run_frequency(task.run_frequency_minutes))
            .bind(task.last_run_at)
            .bind(task.next_run_at)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("create_task"))
    }

    async fn find_task(&self, task_id: Uuid) -> Result<Option<SavedSearchTask>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM saved_searches WHERE id = $1");
        sqlx::query_as::<_, SavedSearchTask>(&query)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_task"))
    }

    async fn set_alert_enabled(
        &self,
        task_id: Uuid,
        enabled: bool,
    ) -> Result<Option<SavedSearchTask>> {
        // Only an off -> on transition resets next_run_at
        let query = format!(
            "UPDATE saved_searches SET \
               next_run_at = CASE WHEN $2 AND NOT alert_enabled THEN NOW() ELSE next_run_at END, \
               alert_enabled = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, SavedSearchTask>(&query)
            .bind(task_id)
            .bind(enabled)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("set_alert_enabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSavedSearchTask;
    use chrono::Duration;

    fn new_task(query: &str) -> NewSavedSearchTask {
        NewSavedSearchTask {
            owner_id: "owner".to_string(),
            query_text: query.to_string(),
            alert_enabled: true,
            ..Default::default()
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_due_selection_orders_oldest_first(pool: PgPool) -> sqlx::Result<()> {
        let store = PgTaskStore::new(pool);
        let first = store.create_task(new_task("first")).await.unwrap();
        let second = store.create_task(new_task("second")).await.unwrap();

        let now = Utc::now();
        store
            .reschedule(second.id, now, now - Duration::minutes(10))
            .await
            .unwrap();

        let due = store.select_due(now, 1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, second.id);
        assert_eq!(store.count_due(now).await.unwrap(), 2);
        assert!(store.find_task(first.id).await.unwrap().is_some());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_record_alert_is_idempotent(pool: PgPool) -> sqlx::Result<()> {
        let store = PgTaskStore::new(pool);
        let task = store.create_task(new_task("gpu")).await.unwrap();
        let record = NewAlertRecord {
            task_id: task.id,
            item_id: "item-1".to_string(),
            deal_score: 88.0,
            alert_type: "deal_alert".to_string(),
        };

        assert!(store.record_alert(record.clone(), Utc::now()).await.unwrap());
        assert!(!store.record_alert(record, Utc::now()).await.unwrap());
        assert!(store.has_alert(task.id, "item-1").await.unwrap());
        assert_eq!(store.alerts_for_task(task.id).await.unwrap().len(), 1);
        Ok(())
    }
}
