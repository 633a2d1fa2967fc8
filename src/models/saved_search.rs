//! # Saved Search Model
//!
//! A user's standing marketplace query and its alert schedule.
//!
//! ## Database Schema
//!
//! Maps to the `saved_searches` table:
//! - `id`: Primary key (UUID)
//! - `owner_id`: External account identifier (TEXT)
//! - `query_text` / `filter_set`: the search itself (TEXT / JSONB)
//! - `alert_enabled`, `minimum_score`, `run_frequency_minutes`: alert policy
//! - `last_run_at`, `next_run_at`: schedule state, written only by the executor
//!
//! `run_frequency_minutes` and `minimum_score` are clamped on every write path in
//! this crate, so readers can rely on the stored values being in range.

use crate::constants::schedule;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque filter map forwarded verbatim to the marketplace search
pub type FilterSet = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SavedSearchTask {
    pub id: Uuid,
    pub owner_id: String,
    pub query_text: String,
    #[sqlx(json)]
    pub filter_set: FilterSet,
    pub alert_enabled: bool,
    pub minimum_score: i32,
    pub run_frequency_minutes: i32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New saved search for creation (without generated fields)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSavedSearchTask {
    pub owner_id: String,
    pub query_text: String,
    pub filter_set: FilterSet,
    pub alert_enabled: bool,
    /// Defaults to 70 when absent
    pub minimum_score: Option<i32>,
    /// Defaults to 15 when absent
    pub run_frequency_minutes: Option<i32>,
}

impl SavedSearchTask {
    /// Build the row a store should persist for `new_task`, eligible immediately
    pub fn from_new(new_task: NewSavedSearchTask, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: new_task.owner_id,
            query_text: new_task.query_text,
            filter_set: new_task.filter_set,
            alert_enabled: new_task.alert_enabled,
            minimum_score: clamp_minimum_score(
                new_task
                    .minimum_score
                    .unwrap_or(schedule::DEFAULT_MINIMUM_SCORE),
            ),
            run_frequency_minutes: clamp_run_frequency(
                new_task
                    .run_frequency_minutes
                    .unwrap_or(schedule::DEFAULT_RUN_FREQUENCY_MINUTES),
            ),
            last_run_at: None,
            next_run_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Due when alerts are on and `next_run_at <= now`. A task with no
    /// `next_run_at` is never due; creation and re-enabling always set it.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.alert_enabled && self.next_run_at.is_some_and(|next| next <= now)
    }

    pub fn run_frequency(&self) -> Duration {
        Duration::minutes(i64::from(clamp_run_frequency(self.run_frequency_minutes)))
    }

    /// Schedule slot following a processing attempt at `ran_at`
    pub fn next_run_after(&self, ran_at: DateTime<Utc>) -> DateTime<Utc> {
        ran_at + self.run_frequency()
    }

    /// Whether a candidate with `deal_score` clears this search's threshold
    pub fn accepts_score(&self, deal_score: f64) -> bool {
        deal_score >= f64::from(clamp_minimum_score(self.minimum_score))
    }
}

pub fn clamp_run_frequency(minutes: i32) -> i32 {
    minutes.clamp(
        schedule::MIN_RUN_FREQUENCY_MINUTES,
        schedule::MAX_RUN_FREQUENCY_MINUTES,
    )
}

pub fn clamp_minimum_score(score: i32) -> i32 {
    score.clamp(schedule::MIN_SCORE, schedule::MAX_SCORE)
}
