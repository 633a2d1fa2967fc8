//! # Key-Value Store
//!
//! The small slice of a key-value store the engine needs: atomic set-if-absent with
//! TTL for the worker lock and the outbound call slot, plus plain get/set for shared
//! circuit breaker state.
//!
//! - [`RedisKeyValueStore`] - shared across instances, the production backend
//! - [`InMemoryKeyValueStore`] - per-instance only; gives no cross-process exclusion

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::InMemoryKeyValueStore;
pub use self::redis::RedisKeyValueStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically store `value` under `key` only if the key is absent. Returns true
    /// when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Store `value` under `key` with no expiry
    async fn set_persistent(&self, key: &str, value: &str) -> Result<()>;

    /// Remaining lifetime in whole seconds; `None` when the key is absent or has no expiry
    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
