#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dealwatch Core
//!
//! Scheduled alert execution engine for saved deal searches.
//!
//! ## Overview
//!
//! Users save searches and opt into alerts. An external trigger calls
//! [`orchestration::RunOrchestrator::run`] periodically; each run re-executes a
//! bounded batch of due searches against a rate-limited marketplace API, filters the
//! results by the user's score threshold, suppresses deals that were already
//! alerted, and sends at most one notification per search.
//!
//! ## Architecture
//!
//! - **Run orchestration**: preflight, minimum spacing between runs, a distributed
//!   single-flight lock and a budgeted, sequential pass over due tasks
//! - **External API gate**: a FIFO queue with one call in flight and fixed spacing,
//!   behind a circuit breaker with progressive cooldown that trips on provider
//!   abuse signals
//! - **At-most-once alerts**: an append-only `(task, item)` history consulted before
//!   every notification
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration (`config` crate, YAML + environment)
//! - [`error`] - Structured error handling
//! - [`logging`] - `tracing` subscriber bootstrap and structured operation logs
//! - [`models`] - Saved searches, deal candidates, alert history records
//! - [`store`] - Task store trait with PostgreSQL and in-memory backends
//! - [`kv`] - Key-value store trait with Redis and in-memory backends
//! - [`lock`] - Distributed execution lock
//! - [`gateway`] - Outbound call gate and provider circuit breaker
//! - [`marketplace`] - Marketplace search collaborator
//! - [`notify`] - Notification collaborator
//! - [`orchestration`] - Selector, executor and run orchestrator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dealwatch_core::config::ConfigManager;
//! use dealwatch_core::marketplace::MarketplaceSearch;
//! use dealwatch_core::notify::TracingNotifier;
//! use dealwatch_core::orchestration::{RunOrchestrator, RunOverrides};
//! use std::sync::Arc;
//!
//! # async fn example(marketplace: Arc<dyn MarketplaceSearch>) -> Result<(), Box<dyn std::error::Error>> {
//! dealwatch_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let orchestrator =
//!     RunOrchestrator::from_config(manager.config(), marketplace, Arc::new(TracingNotifier))?;
//!
//! let result = orchestrator.run(RunOverrides::default()).await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit + integration tests (in-memory backends)
//! DATABASE_URL=postgresql://localhost/dealwatch_test cargo test -- --ignored
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod lock;
pub mod logging;
pub mod marketplace;
pub mod models;
pub mod notify;
pub mod orchestration;
pub mod store;

pub use crate::config::{ConfigManager, EngineConfig, LockFailureMode};
pub use crate::error::{DealwatchError, ProviderError, Result};
pub use crate::gateway::{ApiGate, CircuitBreakerState, ProviderCircuitBreaker};
pub use crate::kv::{InMemoryKeyValueStore, KeyValueStore, RedisKeyValueStore};
pub use crate::lock::{DistributedLock, LockOutcome, LockStatus};
pub use crate::marketplace::{MarketplaceSearch, SearchRequest, SearchResponse};
pub use crate::models::{AlertRecord, DealCandidate, NewSavedSearchTask, SavedSearchTask};
pub use crate::notify::{DealAlert, Notifier, TracingNotifier};
pub use crate::orchestration::{RunOrchestrator, RunOverrides, RunResult, StatusReport, TaskExecution};
pub use crate::store::{InMemoryTaskStore, PgTaskStore, TaskStore};
