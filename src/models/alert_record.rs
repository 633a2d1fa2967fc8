//! # Alert Record Model
//!
//! Append-only dedup log. Maps to the `alert_history` table, whose unique index on
//! `(task_id, item_id)` is what makes notifications at-most-once per item.

use crate::constants::alerts;
use crate::models::DealCandidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AlertRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub item_id: String,
    /// Score at notification time; later rescoring does not touch it
    pub deal_score: f64,
    pub alert_type: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlertRecord {
    pub task_id: Uuid,
    pub item_id: String,
    pub deal_score: f64,
    pub alert_type: String,
}

impl NewAlertRecord {
    pub fn deal_alert(task_id: Uuid, deal: &DealCandidate) -> Self {
        Self {
            task_id,
            item_id: deal.item_id.clone(),
            deal_score: deal.deal_score,
            alert_type: alerts::ALERT_TYPE_DEAL.to_string(),
        }
    }
}

impl AlertRecord {
    pub fn from_new(new_record: NewAlertRecord, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: new_record.task_id,
            item_id: new_record.item_id,
            deal_score: new_record.deal_score,
            alert_type: new_record.alert_type,
            sent_at,
        }
    }
}
