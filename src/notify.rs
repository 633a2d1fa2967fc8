//! # Notification Collaborator
//!
//! Delivery (email, SMS, ...) is external; the executor only hands over one
//! [`DealAlert`] per saved search per run. Transport failures are opaque to the
//! engine, hence `anyhow::Result`.

use crate::models::{DealCandidate, SavedSearchTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One notification covering every newly found deal of a saved search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealAlert {
    pub task_id: Uuid,
    pub owner_id: String,
    pub query_text: String,
    pub deals: Vec<DealCandidate>,
    pub generated_at: DateTime<Utc>,
}

impl DealAlert {
    pub fn new(task: &SavedSearchTask, deals: Vec<DealCandidate>) -> Self {
        Self {
            task_id: task.id,
            owner_id: task.owner_id.clone(),
            query_text: task.query_text.clone(),
            deals,
            generated_at: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        match self.deals.len() {
            1 => format!("1 new deal for \"{}\"", self.query_text),
            n => format!("{n} new deals for \"{}\"", self.query_text),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether the channel is configured well enough to deliver
    fn is_ready(&self) -> bool;

    async fn send(&self, alert: &DealAlert) -> anyhow::Result<()>;
}

/// Writes alerts to the log instead of delivering them; for development and dry runs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn is_ready(&self) -> bool {
        true
    }

    async fn send(&self, alert: &DealAlert) -> anyhow::Result<()> {
        tracing::info!(
            task_id = %alert.task_id,
            owner_id = %alert.owner_id,
            deals = alert.deals.len(),
            subject = %alert.subject(),
            "📬 Deal alert"
        );
        Ok(())
    }
}
