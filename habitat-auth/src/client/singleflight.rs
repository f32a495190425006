//! Deduplication of concurrent identical async operations.
//!
//! A [`SingleFlight`] keeps at most one in-flight future per key. Callers that
//! arrive while a flight is running get a clone of that same future and so
//! observe the same outcome, success or failure. The slot is dropped as soon as
//! the flight completes: this is deduplication, not memoization.
//!
//! Each flight runs on its own tokio task, so it completes and frees its slot
//! even when every caller has stopped waiting.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A cloneable handle on an in-flight operation
pub type Flight<V> = Shared<BoxFuture<'static, V>>;

struct Slot<V> {
    id: u64,
    flight: Flight<V>,
}

type Slots<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

pub struct SingleFlight<K, V> {
    slots: Slots<K, V>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the flight running under `key`, or start one with `operation`.
    ///
    /// `operation` is only invoked when no flight is running. It is called
    /// while the slot table is locked, so it must only build the future and
    /// must not call back into this `SingleFlight`. Must be called from within
    /// a tokio runtime.
    pub fn execute<F, Fut>(&self, key: K, operation: F) -> Flight<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(slot) = slots.get(&key) {
            tracing::debug!(key = ?key, "Joining in-flight operation");
            return slot.flight.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.slots);
        let slot_key = key.clone();
        let operation = operation();

        let task = tokio::spawn(async move {
            let outcome = operation.await;

            let mut slots = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.get(&slot_key).is_some_and(|slot| slot.id == id) {
                slots.remove(&slot_key);
            }

            outcome
        });

        let flight = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                // Cancelled: only happens while the runtime shuts down
                Err(_) => futures::future::pending().await,
            }
        }
        .boxed()
        .shared();

        tracing::debug!(key = ?key, flight = id, "Starting operation");
        slots.insert(
            key,
            Slot {
                id,
                flight: flight.clone(),
            },
        );

        flight
    }

    /// Whether a flight is currently registered under `key`
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<u32>();

        let counter = runs.clone();
        let first = flights.execute("job", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            gate.await.unwrap_or(0)
        });

        let joined: Vec<_> = (0..4)
            .map(|_| {
                let counter = runs.clone();
                flights.execute("job", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    99
                })
            })
            .collect();

        assert!(flights.is_in_flight(&"job"));
        release.send(7).unwrap();

        assert_eq!(first.await, 7);
        for flight in joined {
            assert_eq!(flight.await, 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_slot_cleared_after_failure() {
        let flights: SingleFlight<&'static str, Result<u32, String>> = SingleFlight::new();

        let failed = flights
            .execute("job", || async { Err("boom".to_string()) })
            .await;
        assert_eq!(failed, Err("boom".to_string()));
        assert!(!flights.is_in_flight(&"job"));

        // A fresh attempt runs instead of replaying the failure
        let retried = flights.execute("job", || async { Ok(1) }).await;
        assert_eq!(retried, Ok(1));
    }

    #[tokio::test]
    async fn test_flight_completes_without_callers() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<u32>();

        let counter = runs.clone();
        let flight = flights.execute("job", move || async move {
            let value = gate.await.unwrap_or(0);
            counter.fetch_add(1, Ordering::SeqCst);
            value
        });
        drop(flight);
        assert!(flights.is_in_flight(&"job"));

        release.send(3).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while flights.is_in_flight(&"job") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights: SingleFlight<&'static str, &'static str> = SingleFlight::new();
        let (release, gate) = oneshot::channel::<()>();

        let held = flights.execute("a", move || async move {
            let _ = gate.await;
            "a"
        });
        let other = flights.execute("b", || async { "b" }).await;

        assert_eq!(other, "b");
        assert!(flights.is_in_flight(&"a"));
        release.send(()).unwrap();
        assert_eq!(held.await, "a");
    }
}
