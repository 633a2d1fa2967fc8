//! Error types for the alert execution engine.
//!

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures of an outbound marketplace call, as classified by the gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider throttled or flagged the account (HTTP 429, abuse error codes)
    #[error("Provider rate limited the call: {0}")]
    RateLimited(String),
    /// Network-level failure or timeout; retryable at the caller's discretion
    #[error("Provider transport error: {0}")]
    Transport(String),
    /// The provider answered with something we could not interpret
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }

    pub fn is_abuse_signal(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DealwatchError {
    #[error("Task store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Key-value store error: {0}")]
    KeyValueError(String),
    #[error("Provider circuit open until {cooldown_until} (trip #{trip_count})")]
    ProviderCircuitOpen {
        cooldown_until: DateTime<Utc>,
        trip_count: u32,
    },
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Notification error: {0}")]
    NotificationError(String),
    #[error("Task execution error: {0}")]
    TaskExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DealwatchError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DealwatchError::ProviderCircuitOpen { .. })
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, DealwatchError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for DealwatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DealwatchError::StoreUnavailable(err.to_string())
            }
            other => DealwatchError::DatabaseError(other.to_string()),
        }
    }
}

impl From<deadpool_redis::redis::RedisError> for DealwatchError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        DealwatchError::KeyValueError(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for DealwatchError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        DealwatchError::KeyValueError(format!("Redis pool error: {err}"))
    }
}

impl From<config::ConfigError> for DealwatchError {
    fn from(err: config::ConfigError) -> Self {
        DealwatchError::ConfigurationError(err.to_string())
    }
}

impl From<serde_json::Error> for DealwatchError {
    fn from(err: serde_json::Error) -> Self {
        DealwatchError::ValidationError(format!("JSON serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, DealwatchError>;
