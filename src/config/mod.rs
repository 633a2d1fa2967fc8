//! # Engine Configuration
//!
//! Layered configuration for the alert execution engine. Values start from the
//! defaults in [`crate::constants`], are overridden by optional YAML files and finally
//! by `DEALWATCH__SECTION__KEY` environment variables (see [`loader::ConfigManager`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dealwatch_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let budget = manager.config().worker.scan_budget;
//! let lock_ttl = manager.config().lock.ttl_seconds;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants;
use crate::error::{DealwatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/dealwatch.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relational task store connection
    pub database: DatabaseConfig,

    /// Key-value store used for the worker lock and shared circuit state
    pub redis: RedisConfig,

    /// Run orchestration settings
    pub worker: WorkerConfig,

    /// Distributed execution lock settings
    pub lock: LockConfig,

    /// Outbound marketplace gate settings
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/dealwatch_development".to_string(),
            max_connections: 5,
            acquire_timeout_seconds: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Absent `url` means the in-memory key-value fallback (per-instance only)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub scan_budget: u32,
    pub max_scan_budget: u32,
    pub min_run_interval_seconds: u64,
    pub max_deals_per_alert: usize,
    /// Global feature gate for live provider calls
    pub live_calls_enabled: bool,
    pub dry_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_budget: constants::worker::DEFAULT_SCAN_BUDGET,
            max_scan_budget: constants::worker::MAX_SCAN_BUDGET,
            min_run_interval_seconds: constants::worker::DEFAULT_MIN_RUN_INTERVAL_SECONDS,
            max_deals_per_alert: constants::worker::DEFAULT_MAX_DEALS_PER_ALERT,
            live_calls_enabled: true,
            dry_run: false,
        }
    }
}

impl WorkerConfig {
    pub fn min_run_interval(&self) -> Duration {
        Duration::from_secs(self.min_run_interval_seconds)
    }
}

/// Behaviour of the worker lock when the key-value store cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockFailureMode {
    /// Treat the lock as acquired; runs may overlap during a store outage
    #[default]
    FailOpen,
    /// Treat the lock as contended; no run proceeds during a store outage
    FailClosed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    pub key: String,
    pub ttl_seconds: u64,
    pub failure_mode: LockFailureMode,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: constants::lock::WORKER_LOCK_KEY.to_string(),
            ttl_seconds: constants::lock::LOCK_TTL_SECONDS,
            failure_mode: LockFailureMode::FailOpen,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub min_spacing_millis: u64,
    pub base_cooldown_seconds: u64,
    pub max_cooldown_seconds: u64,
    pub state_key: String,
    pub call_slot_key: String,
    pub call_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_spacing_millis: constants::gateway::MIN_CALL_SPACING_MILLIS,
            base_cooldown_seconds: constants::gateway::BASE_COOLDOWN_SECONDS,
            max_cooldown_seconds: constants::gateway::MAX_COOLDOWN_SECONDS,
            state_key: constants::gateway::CIRCUIT_STATE_KEY.to_string(),
            call_slot_key: constants::gateway::CALL_SLOT_KEY.to_string(),
            call_timeout_seconds: constants::gateway::CALL_TIMEOUT_SECONDS,
        }
    }
}

impl GatewayConfig {
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_millis)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Lifetime of a held call slot: the longest call plus the spacing after it
    pub fn call_slot_lease(&self) -> Duration {
        self.call_timeout() + self.min_spacing()
    }
}

impl EngineConfig {
    /// Reject values that would stall or unbound the worker
    pub fn validate(&self) -> Result<()> {
        let worker = &self.worker;
        if worker.scan_budget == 0 {
            return Err(invalid("worker.scan_budget", "must be greater than 0"));
        }
        if worker.max_scan_budget == 0 || worker.max_scan_budget > constants::worker::MAX_SCAN_BUDGET
        {
            return Err(invalid(
                "worker.max_scan_budget",
                &format!("must be within 1..={}", constants::worker::MAX_SCAN_BUDGET),
            ));
        }
        if worker.max_deals_per_alert == 0 {
            return Err(invalid("worker.max_deals_per_alert", "must be greater than 0"));
        }
        if self.lock.key.trim().is_empty() {
            return Err(invalid("lock.key", "must not be empty"));
        }
        if self.lock.ttl_seconds == 0 {
            return Err(invalid("lock.ttl_seconds", "must be greater than 0"));
        }
        let gateway = &self.gateway;
        if gateway.base_cooldown_seconds == 0 {
            return Err(invalid("gateway.base_cooldown_seconds", "must be greater than 0"));
        }
        if gateway.base_cooldown_seconds > gateway.max_cooldown_seconds {
            return Err(invalid(
                "gateway.max_cooldown_seconds",
                "must not be lower than gateway.base_cooldown_seconds",
            ));
        }
        if gateway.call_timeout_seconds == 0 {
            return Err(invalid("gateway.call_timeout_seconds", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> DealwatchError {
    DealwatchError::ConfigurationError(format!("{field} {reason}"))
}
