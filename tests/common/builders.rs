//! Test data builders and an in-memory engine harness.

#![allow(dead_code)]

use super::mocks::{RecordingNotifier, ScriptedMarketplace};
use chrono::{DateTime, Duration, Utc};
use dealwatch_core::config::EngineConfig;
use dealwatch_core::gateway::ApiGate;
use dealwatch_core::kv::{InMemoryKeyValueStore, KeyValueStore};
use dealwatch_core::marketplace::MarketplaceSearch;
use dealwatch_core::models::{NewSavedSearchTask, SavedSearchTask};
use dealwatch_core::notify::Notifier;
use dealwatch_core::orchestration::{
    EffectiveRunConfig, RunOrchestrator, RunOverrides, TaskExecutor,
};
use dealwatch_core::store::{InMemoryTaskStore, TaskStore};
use std::sync::Arc;

/// Defaults with the time-based guards switched off so tests can run back to back
pub fn fast_engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.worker.min_run_interval_seconds = 0;
    config.gateway.min_spacing_millis = 0;
    config
}

/// Builder for saved searches stored directly in an [`InMemoryTaskStore`]
pub struct SavedSearchBuilder {
    owner_id: String,
    query_text: String,
    minimum_score: Option<i32>,
    run_frequency_minutes: Option<i32>,
    alert_enabled: bool,
    next_run_at: Option<DateTime<Utc>>,
}

impl SavedSearchBuilder {
    pub fn new(query_text: &str) -> Self {
        Self {
            owner_id: "user-1".to_string(),
            query_text: query_text.to_string(),
            minimum_score: None,
            run_frequency_minutes: None,
            alert_enabled: true,
            next_run_at: None,
        }
    }

    pub fn owner(mut self, owner_id: &str) -> Self {
        self.owner_id = owner_id.to_string();
        self
    }

    pub fn minimum_score(mut self, score: i32) -> Self {
        self.minimum_score = Some(score);
        self
    }

    pub fn every_minutes(mut self, minutes: i32) -> Self {
        self.run_frequency_minutes = Some(minutes);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.alert_enabled = false;
        self
    }

    /// Due since `minutes` ago
    pub fn overdue_by(mut self, minutes: i64) -> Self {
        self.next_run_at = Some(Utc::now() - Duration::minutes(minutes));
        self
    }

    /// Not due for another `minutes`
    pub fn due_in(mut self, minutes: i64) -> Self {
        self.next_run_at = Some(Utc::now() + Duration::minutes(minutes));
        self
    }

    pub fn build(self) -> SavedSearchTask {
        let now = Utc::now();
        let mut task = SavedSearchTask::from_new(
            NewSavedSearchTask {
                owner_id: self.owner_id,
                query_text: self.query_text,
                alert_enabled: self.alert_enabled,
                minimum_score: self.minimum_score,
                run_frequency_minutes: self.run_frequency_minutes,
                ..Default::default()
            },
            now,
        );
        // Slightly in the past so the task is due for a `now` taken right after
        task.next_run_at = Some(self.next_run_at.unwrap_or(now - Duration::seconds(1)));
        task
    }

    pub fn insert(self, store: &InMemoryTaskStore) -> SavedSearchTask {
        let task = self.build();
        store.insert_task(task.clone());
        task
    }
}

/// Engine wired entirely to in-memory backends and scripted collaborators
pub struct Harness {
    pub config: EngineConfig,
    pub store: Arc<InMemoryTaskStore>,
    pub kv: Arc<InMemoryKeyValueStore>,
    pub gate: Arc<ApiGate>,
    pub marketplace: Arc<ScriptedMarketplace>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_engine_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let gate = Arc::new(ApiGate::with_shared_state(
            &config.gateway,
            Arc::clone(&kv) as Arc<dyn KeyValueStore>,
        ));
        Self {
            config,
            store: Arc::new(InMemoryTaskStore::new()),
            kv,
            gate,
            marketplace: Arc::new(ScriptedMarketplace::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn orchestrator(&self) -> RunOrchestrator {
        self.orchestrator_with_notifier(Arc::clone(&self.notifier) as Arc<dyn Notifier>)
    }

    pub fn orchestrator_with_notifier(&self, notifier: Arc<dyn Notifier>) -> RunOrchestrator {
        RunOrchestrator::new(
            &self.config,
            Arc::clone(&self.store) as Arc<dyn TaskStore>,
            Arc::clone(&self.kv) as Arc<dyn KeyValueStore>,
            Arc::clone(&self.gate),
            Arc::clone(&self.marketplace) as Arc<dyn MarketplaceSearch>,
            notifier,
        )
    }

    pub fn executor(&self) -> TaskExecutor {
        self.executor_with_notifier(Arc::clone(&self.notifier) as Arc<dyn Notifier>)
    }

    pub fn executor_with_notifier(&self, notifier: Arc<dyn Notifier>) -> TaskExecutor {
        TaskExecutor::new(
            Arc::clone(&self.store) as Arc<dyn TaskStore>,
            Arc::clone(&self.gate),
            Arc::clone(&self.marketplace) as Arc<dyn MarketplaceSearch>,
            notifier,
        )
    }

    pub fn run_config(&self, overrides: RunOverrides) -> EffectiveRunConfig {
        EffectiveRunConfig::resolve(&self.config.worker, &overrides)
    }

    /// Stand-in for the lock TTL running out between runs
    pub async fn expire_lock(&self) {
        self.kv
            .delete(&self.config.lock.key)
            .await
            .expect("in-memory delete");
    }

    pub async fn stored(&self, task: &SavedSearchTask) -> SavedSearchTask {
        self.store
            .find_task(task.id)
            .await
            .expect("store available")
            .expect("task exists")
    }

    /// Pull the stored schedule of each task back into the past
    pub async fn make_due_again(&self, tasks: &[SavedSearchTask]) {
        for task in tasks {
            let mut due = self.stored(task).await;
            due.next_run_at = Some(Utc::now() - Duration::seconds(1));
            self.store.insert_task(due);
        }
    }
}
