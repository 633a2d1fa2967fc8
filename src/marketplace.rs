//! # Marketplace Search Collaborator
//!
//! The outbound search the worker re-runs for each saved search. Ranking and deal
//! scoring happen behind this trait; the engine only sees scored candidates plus
//! whatever provider warnings came back with them.

use crate::constants::gateway;
use crate::error::ProviderError;
use crate::models::{DealCandidate, FilterSet, SavedSearchTask};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    pub filters: FilterSet,
}

impl From<&SavedSearchTask> for SearchRequest {
    fn from(task: &SavedSearchTask) -> Self {
        Self {
            query_text: task.query_text.clone(),
            filters: task.filter_set.clone(),
        }
    }
}

/// Non-fatal notice attached to a provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderWarning {
    pub error_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub candidates: Vec<DealCandidate>,
    pub warnings: Vec<ProviderWarning>,
}

impl SearchResponse {
    pub fn with_candidates(candidates: Vec<DealCandidate>) -> Self {
        Self {
            candidates,
            warnings: Vec::new(),
        }
    }
}

/// Responses that can carry a provider abuse / rate-limit signal even when the call
/// itself succeeded
pub trait AbuseSignal {
    fn abuse_signal(&self) -> Option<String>;
}

impl AbuseSignal for SearchResponse {
    fn abuse_signal(&self) -> Option<String> {
        self.warnings
            .iter()
            .find(|warning| {
                warning.error_id.as_deref() == Some(gateway::ABUSE_ERROR_ID)
                    || is_abuse_message(&warning.message)
            })
            .map(|warning| warning.message.clone())
    }
}

pub fn is_abuse_message(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .contains(gateway::ABUSE_MESSAGE_FRAGMENT)
}

/// Error ids carried in a JSON error body, from any `errorId` / `error_id` field
/// at any depth. Non-JSON bodies carry none.
pub fn body_error_ids(body: &str) -> Vec<String> {
    let mut ids = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        collect_error_ids(&value, &mut ids);
    }
    ids
}

fn collect_error_ids(value: &Value, ids: &mut Vec<String>) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                if key == "errorId" || key == "error_id" {
                    push_error_id(field, ids);
                } else {
                    collect_error_ids(field, ids);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_error_ids(item, ids)),
        _ => {}
    }
}

// Providers send ids as strings, numbers or single-element arrays
fn push_error_id(field: &Value, ids: &mut Vec<String>) {
    match field {
        Value::String(id) => ids.push(id.clone()),
        Value::Number(id) => ids.push(id.to_string()),
        Value::Array(items) => items.iter().for_each(|item| push_error_id(item, ids)),
        _ => {}
    }
}

/// Classify a raw HTTP status + body from the provider into a [`ProviderError`]
pub fn classify_http_failure(status: u16, body: &str) -> ProviderError {
    if status == gateway::HTTP_TOO_MANY_REQUESTS
        || body_error_ids(body)
            .iter()
            .any(|id| id == gateway::ABUSE_ERROR_ID)
        || is_abuse_message(body)
    {
        ProviderError::RateLimited(format!("HTTP {status}: {body}"))
    } else if status >= 500 {
        ProviderError::Transport(format!("HTTP {status}: {body}"))
    } else {
        ProviderError::InvalidResponse(format!("HTTP {status}: {body}"))
    }
}

#[async_trait]
pub trait MarketplaceSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError>;
}
