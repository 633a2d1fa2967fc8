use super::KeyValueStore;
use crate::error::{DealwatchError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Per-instance fallback store. Two processes each holding one of these do not see
/// each other's keys, so the worker lock degrades to per-instance exclusion.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    // `None` expiry: kept until overwritten or deleted
    entries: DashMap<String, (String, Option<Instant>)>,
    available: AtomicBool,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with a key-value error
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DealwatchError::KeyValueError(
                "in-memory key-value store marked unavailable".to_string(),
            ))
        }
    }

    fn live_value(&self, key: &str) -> Option<(String, Option<Instant>)> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        let (value, expires_at) = entry.value().clone();
        drop(entry);
        if is_expired(expires_at, now) {
            self.entries
                .remove_if(key, |_, (_, at)| is_expired(*at, now));
            None
        } else {
            Some((value, expires_at))
        }
    }
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if is_expired(entry.get().1, now) {
                    entry.insert((value.to_string(), Some(now + ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert((value.to_string(), Some(now + ttl)));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        Ok(self.live_value(key).map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_available()?;
        self.entries
            .insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn set_persistent(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries
            .insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>> {
        self.ensure_available()?;
        Ok(self
            .live_value(key)
            .and_then(|(_, expires_at)| expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs() as i64))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries.remove(key);
        Ok(())
    }
}
