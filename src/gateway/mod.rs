//! # External API Gate
//!
//! The single choke point for outbound marketplace calls. Every call goes through
//! [`ApiGate::submit`], which:
//!
//! 1. rejects immediately with [`DealwatchError::ProviderCircuitOpen`] while the
//!    circuit breaker is cooling down,
//! 2. waits its turn in a FIFO queue that allows one call in flight with a minimum
//!    spacing between calls,
//! 3. re-checks the breaker (it may have tripped while we waited),
//! 4. runs the call under a timeout and trips the breaker if the outcome carries a
//!    provider abuse signal.
//!
//! One gate instance is meant to be shared (via `Arc`) by everything in the process
//! that talks to the provider. A gate built with [`ApiGate::with_shared_state`] also
//! coordinates with gates in other processes through the key-value store: breaker
//! trips are mirrored and the one-call-in-flight rule holds across instances. A gate
//! from [`ApiGate::from_config`] enforces both per instance only.
//!
//! ```rust
//! use dealwatch_core::config::GatewayConfig;
//! use dealwatch_core::gateway::ApiGate;
//! use dealwatch_core::marketplace::SearchResponse;
//!
//! # tokio_test::block_on(async {
//! let gate = ApiGate::from_config(&GatewayConfig::default());
//! let response = gate
//!     .submit(|| async { Ok(SearchResponse::default()) })
//!     .await
//!     .unwrap();
//! assert!(response.candidates.is_empty());
//! # });
//! ```

pub mod circuit_breaker;
pub mod queue;

use crate::config::GatewayConfig;
use crate::error::{DealwatchError, ProviderError, Result};
use crate::kv::KeyValueStore;
use crate::logging::log_gate_operation;
use crate::marketplace::AbuseSignal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub use circuit_breaker::{CircuitBreakerState, CooldownPolicy, ProviderCircuitBreaker};
pub use queue::CallQueue;

#[derive(Debug)]
pub struct ApiGate {
    breaker: ProviderCircuitBreaker,
    queue: CallQueue,
    call_timeout: Duration,
}

impl ApiGate {
    pub fn new(breaker: ProviderCircuitBreaker, queue: CallQueue, call_timeout: Duration) -> Self {
        Self {
            breaker,
            queue,
            call_timeout,
        }
    }

    /// Gate with process-local breaker state
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            ProviderCircuitBreaker::new(
                "marketplace",
                CooldownPolicy::from_seconds(
                    config.base_cooldown_seconds,
                    config.max_cooldown_seconds,
                ),
            ),
            CallQueue::new(config.min_spacing()),
            config.call_timeout(),
        )
    }

    /// Gate whose breaker state and call slot live in `store`, shared with peer instances
    pub fn with_shared_state(config: &GatewayConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let gate = Self::from_config(config);
        Self {
            breaker: gate
                .breaker
                .with_shared_state(Arc::clone(&store), config.state_key.clone()),
            queue: gate.queue.with_shared_slot(
                store,
                config.call_slot_key.clone(),
                config.call_slot_lease(),
            ),
            ..gate
        }
    }

    pub fn breaker(&self) -> &ProviderCircuitBreaker {
        &self.breaker
    }

    pub fn queue(&self) -> &CallQueue {
        &self.queue
    }

    /// Run `call` through the breaker and the serialized queue
    #[instrument(skip(self, call), fields(waiting = self.queue.waiting()))]
    pub async fn submit<F, Fut, T>(&self, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
        T: AbuseSignal,
    {
        self.breaker.check().await?;

        self.queue
            .run(|| async {
                if let Err(open) = self.breaker.check().await {
                    return Err(open);
                }

                let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ProviderError::Transport(format!(
                        "call exceeded {}s timeout",
                        self.call_timeout.as_secs()
                    ))),
                };

                let signal = match &outcome {
                    Ok(response) => response.abuse_signal(),
                    Err(e) if e.is_abuse_signal() => Some(e.to_string()),
                    Err(_) => None,
                };
                if let Some(signal) = signal {
                    let state = self.breaker.trip(&signal).await;
                    log_gate_operation(
                        "trip",
                        "circuit_open",
                        Some(&format!(
                            "trip_count={} signal={signal}",
                            state.trip_count
                        )),
                    );
                } else {
                    debug!(ok = outcome.is_ok(), "Outbound call completed");
                }

                outcome.map_err(DealwatchError::from)
            })
            .await
    }
}
