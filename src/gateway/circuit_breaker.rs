//! # Provider Circuit Breaker
//!
//! Trips when the marketplace signals abuse or rate limiting, and rejects outbound
//! calls until a cooldown elapses. Cooldowns grow linearly with the number of trips
//! (`base * trip_count`) up to a cap; the trip counter is only cleared by an
//! explicit operator reset.
//!
//! State is held locally and, when a key-value store is attached, mirrored there as
//! JSON with no expiry so peer instances observe each other's trips. On refresh the
//! copies are merged: a newer operator reset generation wins outright, otherwise the
//! higher trip count wins, so a lost or stale shared copy can never move the count
//! backwards. If the store is unreachable the local copy is used, which makes the
//! breaker per-instance for the duration of the outage.

use crate::constants::gateway;
use crate::error::{DealwatchError, Result};
use crate::kv::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Monotonic until an operator reset
    pub trip_count: u32,
    pub last_signal: Option<String>,
    pub last_tripped_at: Option<DateTime<Utc>>,
    /// Bumped by every operator reset
    #[serde(default)]
    pub reset_generation: u32,
}

impl CircuitBreakerState {
    /// Fold a peer's copy into this one. Returns true when the local copy had
    /// information the peer lacked.
    fn merge(&mut self, remote: CircuitBreakerState) -> bool {
        if remote.reset_generation != self.reset_generation {
            if remote.reset_generation > self.reset_generation {
                *self = remote;
                return false;
            }
            return true;
        }
        if remote.trip_count >= self.trip_count {
            *self = remote;
            return false;
        }
        if remote.is_open && remote.cooldown_until > self.cooldown_until {
            self.is_open = true;
            self.cooldown_until = remote.cooldown_until;
        }
        true
    }
}

/// Linear progressive cooldown: `min(base * trip_count, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(gateway::BASE_COOLDOWN_SECONDS as i64),
            max: Duration::seconds(gateway::MAX_COOLDOWN_SECONDS as i64),
        }
    }
}

impl CooldownPolicy {
    pub fn from_seconds(base_seconds: u64, max_seconds: u64) -> Self {
        Self {
            base: Duration::seconds(base_seconds as i64),
            max: Duration::seconds(max_seconds as i64),
        }
    }

    pub fn cooldown_for(&self, trip_count: u32) -> Duration {
        let seconds = self
            .base
            .num_seconds()
            .saturating_mul(i64::from(trip_count.max(1)));
        Duration::seconds(seconds.min(self.max.num_seconds()))
    }
}

#[derive(Clone)]
struct SharedState {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

pub struct ProviderCircuitBreaker {
    name: String,
    policy: CooldownPolicy,
    state: Arc<Mutex<CircuitBreakerState>>,
    shared: Option<SharedState>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProviderCircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCircuitBreaker")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("state", &*self.state.lock())
            .field("shared", &self.shared.as_ref().map(|s| s.key.as_str()))
            .finish()
    }
}

impl ProviderCircuitBreaker {
    /// Process-local breaker; trips are not visible to other instances
    pub fn new(name: impl Into<String>, policy: CooldownPolicy) -> Self {
        let name = name.into();
        info!(
            component = %name,
            base_cooldown_seconds = policy.base.num_seconds(),
            max_cooldown_seconds = policy.max.num_seconds(),
            "🛡️ Provider circuit breaker initialized"
        );
        Self {
            name,
            policy,
            state: Arc::new(Mutex::new(CircuitBreakerState::default())),
            shared: None,
            reset_task: Mutex::new(None),
        }
    }

    /// Mirror state to `store` under `key` for cross-instance visibility
    pub fn with_shared_state(
        mut self,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
    ) -> Self {
        self.shared = Some(SharedState {
            store,
            key: key.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    /// Local view of the state, without consulting the shared store
    pub fn snapshot(&self) -> CircuitBreakerState {
        self.state.lock().clone()
    }

    /// Latest known state, refreshed from the shared store when one is attached
    pub async fn current_state(&self) -> CircuitBreakerState {
        self.refresh_from_shared().await;
        self.snapshot()
    }

    /// Admission check before an outbound call
    pub async fn check(&self) -> Result<()> {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<()> {
        self.refresh_from_shared().await;

        let recovered = {
            let mut state = self.state.lock();
            if !state.is_open {
                return Ok(());
            }
            match state.cooldown_until {
                Some(until) if now < until => {
                    debug!(
                        component = %self.name,
                        cooldown_until = %until,
                        "Circuit open - rejecting call"
                    );
                    return Err(DealwatchError::ProviderCircuitOpen {
                        cooldown_until: until,
                        trip_count: state.trip_count,
                    });
                }
                _ => {
                    state.is_open = false;
                    state.clone()
                }
            }
        };

        info!(
            component = %self.name,
            trip_count = recovered.trip_count,
            "🟢 Circuit breaker closed (cooldown elapsed)"
        );
        self.persist(&recovered).await;
        Ok(())
    }

    /// Record a provider abuse signal and open the circuit
    pub async fn trip(&self, signal: &str) -> CircuitBreakerState {
        self.trip_at(Utc::now(), signal).await
    }

    pub async fn trip_at(&self, now: DateTime<Utc>, signal: &str) -> CircuitBreakerState {
        self.refresh_from_shared().await;

        let (tripped, cooldown) = {
            let mut state = self.state.lock();
            state.trip_count = state.trip_count.saturating_add(1);
            let cooldown = self.policy.cooldown_for(state.trip_count);
            state.is_open = true;
            state.cooldown_until = Some(now + cooldown);
            state.last_signal = Some(signal.to_string());
            state.last_tripped_at = Some(now);
            (state.clone(), cooldown)
        };

        error!(
            component = %self.name,
            trip_count = tripped.trip_count,
            cooldown_seconds = cooldown.num_seconds(),
            signal = %signal,
            "🔴 Circuit breaker opened (provider abuse signal)"
        );

        self.persist(&tripped).await;
        self.schedule_reset(&tripped, cooldown);
        tripped
    }

    /// Operator action: close the circuit and clear the trip counter on every instance
    pub async fn reset_trip_count(&self) {
        if let Some(handle) = self.reset_task.lock().take() {
            handle.abort();
        }
        self.refresh_from_shared().await;
        let cleared = {
            let mut state = self.state.lock();
            *state = CircuitBreakerState {
                reset_generation: state.reset_generation.saturating_add(1),
                ..CircuitBreakerState::default()
            };
            state.clone()
        };
        warn!(component = %self.name, "🚨 Circuit breaker trip count reset by operator");
        self.persist(&cleared).await;
    }

    // Closes the circuit at cooldown expiry even if no call arrives to trigger the
    // lazy reset in `check_at`. Without a runtime only the lazy path applies.
    fn schedule_reset(&self, tripped: &CircuitBreakerState, cooldown: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Ok(delay) = cooldown.to_std() else {
            return;
        };

        let state = Arc::clone(&self.state);
        let shared = self.shared.clone();
        let name = self.name.clone();
        let expected_until = tripped.cooldown_until;

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let reopened = {
                let mut current = state.lock();
                // A later trip owns its own reset
                if !current.is_open || current.cooldown_until != expected_until {
                    return;
                }
                current.is_open = false;
                current.clone()
            };
            info!(component = %name, "🟡 Circuit breaker auto-reset at cooldown expiry");
            if let Some(shared) = shared {
                write_shared(&shared, &reopened).await;
            }
        });

        if let Some(previous) = self.reset_task.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn refresh_from_shared(&self) {
        let Some(shared) = &self.shared else {
            return;
        };
        match shared.store.get(&shared.key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CircuitBreakerState>(&raw) {
                Ok(remote) => {
                    let ahead = {
                        let mut state = self.state.lock();
                        state.merge(remote).then(|| state.clone())
                    };
                    if let Some(merged) = ahead {
                        debug!(
                            component = %self.name,
                            trip_count = merged.trip_count,
                            "Shared circuit state behind local state - republishing"
                        );
                        write_shared(shared, &merged).await;
                    }
                }
                Err(e) => warn!(
                    component = %self.name,
                    error = %e,
                    "Ignoring unreadable shared circuit state"
                ),
            },
            Ok(None) => {}
            Err(e) => debug!(
                component = %self.name,
                error = %e,
                "Shared circuit state unavailable - using local state"
            ),
        }
    }

    async fn persist(&self, state: &CircuitBreakerState) {
        if let Some(shared) = &self.shared {
            write_shared(shared, state).await;
        }
    }
}

async fn write_shared(shared: &SharedState, state: &CircuitBreakerState) {
    match serde_json::to_string(state) {
        Ok(raw) => {
            if let Err(e) = shared.store.set_persistent(&shared.key, &raw).await {
                warn!(key = %shared.key, error = %e, "Failed to mirror circuit state");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize circuit state"),
    }
}

impl Drop for ProviderCircuitBreaker {
    fn drop(&mut self) {
        if let Some(handle) = self.reset_task.lock().take() {
            handle.abort();
        }
    }
}
