//! Serialized call queue.
//!
//! Admits one outbound call at a time and keeps at least `min_spacing` between the
//! end of one call and the start of the next. Waiters are served in arrival order
//! (tokio's mutex is FIFO-fair).
//!
//! Inside one process the mutex is enough. With a shared slot attached, a caller
//! must also own a key-value slot before calling out: the slot is taken with
//! `set_if_absent` under a lease covering the call, and on completion it is left in
//! place for `min_spacing` so peers on other instances keep the same spacing. If the
//! key-value store is unreachable the queue falls back to per-instance ordering.

use crate::constants::gateway;
use crate::kv::KeyValueStore;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{trace, warn};
use uuid::Uuid;

struct SharedSlot {
    store: Arc<dyn KeyValueStore>,
    key: String,
    lease: Duration,
}

pub struct CallQueue {
    last_call_finished: Mutex<Option<Instant>>,
    min_spacing: Duration,
    waiting: AtomicUsize,
    shared: Option<SharedSlot>,
}

impl std::fmt::Debug for CallQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallQueue")
            .field("min_spacing", &self.min_spacing)
            .field("waiting", &self.waiting())
            .field("shared_slot", &self.shared.as_ref().map(|s| s.key.as_str()))
            .finish()
    }
}

impl CallQueue {
    /// Per-instance queue
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            last_call_finished: Mutex::new(None),
            min_spacing,
            waiting: AtomicUsize::new(0),
            shared: None,
        }
    }

    /// Serialize calls across every instance sharing `store`. `lease` bounds how long
    /// a crashed holder can block the slot and must cover the longest call.
    pub fn with_shared_slot(
        mut self,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        lease: Duration,
    ) -> Self {
        self.shared = Some(SharedSlot {
            store,
            key: key.into(),
            lease,
        });
        self
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Submissions waiting for their turn, excluding the one in flight
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Run `call` once every earlier submission has finished and the spacing has elapsed
    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let mut last_finished = self.last_call_finished.lock().await;
        self.waiting.fetch_sub(1, Ordering::Relaxed);

        if let Some(finished) = *last_finished {
            let ready_at = finished + self.min_spacing;
            if ready_at > Instant::now() {
                trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Spacing outbound call"
                );
                sleep_until(ready_at).await;
            }
        }

        let slot_token = match &self.shared {
            Some(slot) => self.acquire_slot(slot).await,
            None => None,
        };

        let output = call().await;
        *last_finished = Some(Instant::now());

        if let (Some(slot), Some(token)) = (&self.shared, slot_token) {
            self.release_slot(slot, &token).await;
        }
        output
    }

    // Returns the token when the slot is held, `None` when running without it
    async fn acquire_slot(&self, slot: &SharedSlot) -> Option<String> {
        let token = Uuid::new_v4().to_string();
        let poll = Duration::from_millis(gateway::CALL_SLOT_POLL_MILLIS);
        loop {
            match slot.store.set_if_absent(&slot.key, &token, slot.lease).await {
                Ok(true) => return Some(token),
                Ok(false) => {
                    trace!(key = %slot.key, "Call slot held by another instance");
                    sleep(poll).await;
                }
                Err(e) => {
                    warn!(
                        key = %slot.key,
                        error = %e,
                        "Shared call slot unavailable - serializing per instance only"
                    );
                    return None;
                }
            }
        }
    }

    // Keeps the slot for `min_spacing` after the call so peers wait out the spacing too
    async fn release_slot(&self, slot: &SharedSlot, token: &str) {
        match slot.store.get(&slot.key).await {
            Ok(Some(holder)) if holder == token => {}
            Ok(_) => {
                warn!(key = %slot.key, "Call slot lease expired before the call finished");
                return;
            }
            Err(e) => {
                warn!(key = %slot.key, error = %e, "Failed to release call slot");
                return;
            }
        }

        let released = if self.min_spacing.is_zero() {
            slot.store.delete(&slot.key).await
        } else {
            slot.store.set(&slot.key, token, self.min_spacing).await
        };
        if let Err(e) = released {
            warn!(key = %slot.key, error = %e, "Failed to release call slot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKeyValueStore;

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced() {
        let queue = CallQueue::new(Duration::from_millis(1300));
        let start = Instant::now();

        let first = queue.run(|| async { Instant::now() }).await;
        let second = queue.run(|| async { Instant::now() }).await;
        let third = queue.run(|| async { Instant::now() }).await;

        assert_eq!(first, start);
        assert!(second - first >= Duration::from_millis(1300));
        assert!(third - second >= Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_run_one_at_a_time_in_order() {
        let queue = Arc::new(CallQueue::new(Duration::from_millis(1300)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .run(|| async move {
                        let concurrent = in_flight.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(concurrent, 0, "calls overlapped");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        order.lock().push(i);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
            // Fix arrival order
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert_eq!(queue.waiting(), 0);
    }

    fn shared_queue(store: &Arc<InMemoryKeyValueStore>, spacing: Duration) -> CallQueue {
        CallQueue::new(spacing).with_shared_slot(
            store.clone(),
            "provider:call_slot",
            Duration::from_secs(30),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_slot_serializes_calls_across_instances() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let instance_a = shared_queue(&store, Duration::ZERO);
        let instance_b = shared_queue(&store, Duration::ZERO);
        let in_flight = AtomicUsize::new(0);
        let max_in_flight = AtomicUsize::new(0);

        let outbound = || async {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        };

        tokio::join!(instance_a.run(outbound), instance_b.run(outbound));

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("provider:call_slot").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_slot_spaces_calls_across_instances() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let spacing = Duration::from_millis(1300);
        let instance_a = shared_queue(&store, spacing);
        let instance_b = shared_queue(&store, spacing);

        let first_finished = instance_a
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Instant::now()
            })
            .await;
        let second_started = instance_b.run(|| async { Instant::now() }).await;

        assert!(second_started - first_finished >= spacing);
    }

    #[tokio::test]
    async fn test_unreachable_slot_store_still_runs_calls() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.set_available(false);
        let queue = shared_queue(&store, Duration::ZERO);

        assert_eq!(queue.run(|| async { 7 }).await, 7);
    }
}
