//! # System Constants
//!
//! Fixed names, defaults and clamps that define the operational boundaries of the
//! alert execution engine. Everything tunable at deploy time lives in [`crate::config`];
//! the values here are the defaults those settings start from.

/// Saved-search schedule bounds and defaults
pub mod schedule {
    /// Lower bound for `run_frequency_minutes`
    pub const MIN_RUN_FREQUENCY_MINUTES: i32 = 5;
    /// Upper bound for `run_frequency_minutes` (one day)
    pub const MAX_RUN_FREQUENCY_MINUTES: i32 = 1440;
    pub const DEFAULT_RUN_FREQUENCY_MINUTES: i32 = 15;

    pub const MIN_SCORE: i32 = 0;
    pub const MAX_SCORE: i32 = 100;
    pub const DEFAULT_MINIMUM_SCORE: i32 = 70;
}

/// Worker run defaults
pub mod worker {
    pub const DEFAULT_SCAN_BUDGET: u32 = 20;
    /// Hard cap applied by the trigger layer; configuration may lower it, never raise it
    pub const MAX_SCAN_BUDGET: u32 = 50;
    pub const DEFAULT_MIN_RUN_INTERVAL_SECONDS: u64 = 30;
    pub const DEFAULT_MAX_DEALS_PER_ALERT: usize = 5;
}

/// Distributed lock defaults
pub mod lock {
    pub const WORKER_LOCK_KEY: &str = "alert_worker:lock";
    pub const LOCK_TTL_SECONDS: u64 = 600;
}

/// External API gate defaults
pub mod gateway {
    pub const MIN_CALL_SPACING_MILLIS: u64 = 1300;
    pub const BASE_COOLDOWN_SECONDS: u64 = 60;
    pub const MAX_COOLDOWN_SECONDS: u64 = 300;
    pub const CIRCUIT_STATE_KEY: &str = "provider:circuit_breaker";
    pub const CALL_SLOT_KEY: &str = "provider:call_slot";
    /// Poll interval while another instance holds the call slot
    pub const CALL_SLOT_POLL_MILLIS: u64 = 100;
    pub const CALL_TIMEOUT_SECONDS: u64 = 30;

    /// Provider error id for "call limit exceeded"
    pub const ABUSE_ERROR_ID: &str = "10001";
    pub const ABUSE_MESSAGE_FRAGMENT: &str = "exceeded the number of times";
    pub const HTTP_TOO_MANY_REQUESTS: u16 = 429;
}

/// Alert history values
pub mod alerts {
    pub const ALERT_TYPE_DEAL: &str = "deal_alert";
}

/// Synthetic identifiers used in run reports
pub mod report {
    pub const WORKER_FATAL_QUERY: &str = "worker_fatal";
}
