//! # Distributed Execution Lock
//!
//! Single-flight guard for worker runs across instances, built on the key-value
//! store's atomic set-if-absent with a TTL.
//!
//! There is deliberately no `release`: a run keeps the key until it expires. A run
//! that crashes therefore cannot leave a permanent lock behind, at the price of the
//! next run waiting out the remainder of the TTL.
//!
//! When the key-value store is unreachable the outcome follows
//! [`LockFailureMode`]: fail-open treats the lock as acquired (best-effort
//! single-flight), fail-closed treats it as contended.

use crate::config::{LockConfig, LockFailureMode};
use crate::kv::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Result of one acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOutcome {
    /// The key was absent and is now ours
    Acquired,
    /// Another run holds the key
    Contended,
    /// Store unreachable, proceeding anyway (fail-open)
    AcquiredDegraded,
    /// Store unreachable, refusing to run (fail-closed)
    RefusedDegraded,
}

impl LockOutcome {
    pub fn is_acquired(self) -> bool {
        matches!(self, LockOutcome::Acquired | LockOutcome::AcquiredDegraded)
    }
}

/// Point-in-time view of the lock for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub key: String,
    pub held: bool,
    pub remaining_ttl_seconds: Option<i64>,
}

pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    ttl: Duration,
    failure_mode: LockFailureMode,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("failure_mode", &self.failure_mode)
            .finish()
    }
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &LockConfig) -> Self {
        Self {
            store,
            key: config.key.clone(),
            ttl: Duration::from_secs(config.ttl_seconds),
            failure_mode: config.failure_mode,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Attempt to take the lock for `run_id`
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn try_acquire(&self, run_id: &str) -> LockOutcome {
        match self.store.set_if_absent(&self.key, run_id, self.ttl).await {
            Ok(true) => {
                info!(run_id, ttl_seconds = self.ttl.as_secs(), "🔒 Worker lock acquired");
                LockOutcome::Acquired
            }
            Ok(false) => {
                debug!(run_id, "Worker lock held by another run");
                LockOutcome::Contended
            }
            Err(e) => match self.failure_mode {
                LockFailureMode::FailOpen => {
                    warn!(
                        run_id,
                        error = %e,
                        "⚠️ Lock store unreachable - proceeding without mutual exclusion (fail-open)"
                    );
                    LockOutcome::AcquiredDegraded
                }
                LockFailureMode::FailClosed => {
                    warn!(
                        run_id,
                        error = %e,
                        "⚠️ Lock store unreachable - refusing to run (fail-closed)"
                    );
                    LockOutcome::RefusedDegraded
                }
            },
        }
    }

    /// Whether any run currently holds the key. Store errors read as not held.
    pub async fn is_held(&self) -> bool {
        match self.store.get(&self.key).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                debug!(error = %e, "Could not read worker lock state");
                false
            }
        }
    }

    pub async fn remaining_ttl(&self) -> Option<i64> {
        self.store.ttl_seconds(&self.key).await.unwrap_or_else(|e| {
            debug!(error = %e, "Could not read worker lock TTL");
            None
        })
    }

    pub async fn status(&self) -> LockStatus {
        LockStatus {
            key: self.key.clone(),
            held: self.is_held().await,
            remaining_ttl_seconds: self.remaining_ttl().await,
        }
    }
}
