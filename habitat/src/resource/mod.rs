//! Keyed async resource synchronization.
//!
//! A [`KeyedResource`] holds the state fetched for the current key of a
//! [`KeySource`]. Every fetch captures the `(key, generation)` it was started
//! for; its result is only written back if both still match once the fetch
//! completes. Every key change bumps the generation and clears the state, so
//! late responses for a superseded key are dropped on the floor.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::key_source::{KeyObserver, KeySource};

/// Failure recorded for the current key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<V> {
    pub generation: u64,
    pub loading_count: u32,
    pub value: Option<V>,
    pub error: Option<ErrorInfo>,
}

impl<V> Default for ResourceState<V> {
    fn default() -> Self {
        Self {
            generation: 0,
            loading_count: 0,
            value: None,
            error: None,
        }
    }
}

impl<V> ResourceState<V> {
    pub fn is_loading(&self) -> bool {
        self.loading_count > 0
    }

    /// A fetch for the current generation has completed and nothing is in flight
    pub fn is_settled(&self) -> bool {
        !self.is_loading() && (self.value.is_some() || self.error.is_some())
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.loading_count = 0;
        self.value = None;
        self.error = None;
    }
}

type FetchFn<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, String>> + Send + Sync>;

struct ResourceInner<K, V> {
    name: String,
    source: KeySource<K>,
    fetch: FetchFn<K, V>,
    state: Mutex<ResourceState<V>>,
    revision: watch::Sender<u64>,
}

impl<K, V> ResourceInner<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, ResourceState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, state: &ResourceState<V>, key: &K, generation: u64) -> bool {
        state.generation == generation && self.source.current().as_ref() == Some(key)
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl<K, V> KeyObserver<K> for ResourceInner<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Send,
{
    fn key_changed(&self, key: Option<&K>) {
        let generation = {
            let mut state = self.lock();
            state.reset();
            state.generation
        };
        tracing::debug!(
            "{}: key changed (present={}), generation {}",
            self.name,
            key.is_some(),
            generation
        );
        self.touch();
    }
}

/// Decrements the loading counter for one fetch, once.
///
/// Runs on completion or when the fetch future is dropped mid-flight. The
/// counter is only touched while the fetch is still current.
struct LoadingGuard<'a, K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    inner: &'a ResourceInner<K, V>,
    key: K,
    generation: u64,
    armed: bool,
}

impl<K, V> LoadingGuard<'_, K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    fn settle(&mut self, state: &mut ResourceState<V>) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if self.inner.is_current(state, &self.key, self.generation) && state.loading_count > 0 {
            state.loading_count -= 1;
        }
    }
}

impl<K, V> Drop for LoadingGuard<'_, K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = self.inner;
        let mut state = inner.lock();
        self.settle(&mut state);
        drop(state);
        inner.touch();
    }
}

/// State for one resource kind, kept in sync with a key source.
///
/// Cheap to clone; clones share state.
pub struct KeyedResource<K, V> {
    inner: Arc<ResourceInner<K, V>>,
}

impl<K, V> Clone for KeyedResource<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> KeyedResource<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    pub fn new<F, Fut, E>(name: impl Into<String>, source: &KeySource<K>, fetch: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + 'static,
    {
        let fetch: FetchFn<K, V> = Arc::new(move |key| {
            fetch(key)
                .map(|result| result.map_err(|e| e.to_string()))
                .boxed()
        });
        let (revision, _) = watch::channel(0);

        let inner = Arc::new(ResourceInner {
            name: name.into(),
            source: source.clone(),
            fetch,
            state: Mutex::new(ResourceState::default()),
            revision,
        });
        let observer: Arc<dyn KeyObserver<K>> = inner.clone();
        source.subscribe(&observer);

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn source(&self) -> &KeySource<K> {
        &self.inner.source
    }

    /// Fetch the state for the current key.
    ///
    /// Returns `None` when there is no key, when the fetch failed, or when
    /// the key changed while the fetch was in flight.
    pub async fn fetch(&self) -> Option<V> {
        let inner = &*self.inner;

        let mut guard = {
            let mut state = inner.lock();
            let key = inner.source.current()?;
            state.loading_count += 1;
            LoadingGuard {
                inner,
                key,
                generation: state.generation,
                armed: true,
            }
        };
        inner.touch();
        tracing::debug!("{}: fetching (generation {})", inner.name, guard.generation);

        let result = (inner.fetch)(guard.key.clone()).await;

        let outcome = {
            let mut state = inner.lock();
            let current = inner.is_current(&state, &guard.key, guard.generation);
            let outcome = match result {
                Ok(value) if current => {
                    state.value = Some(value.clone());
                    state.error = None;
                    Some(value)
                }
                Err(message) if current => {
                    tracing::warn!("{}: fetch failed: {}", inner.name, message);
                    state.error = Some(ErrorInfo::new(message));
                    None
                }
                Ok(_) | Err(_) => {
                    tracing::debug!(
                        "{}: discarding stale result (generation {})",
                        inner.name,
                        guard.generation
                    );
                    None
                }
            };
            guard.settle(&mut state);
            outcome
        };
        inner.touch();

        outcome
    }

    pub fn value(&self) -> Option<V> {
        self.inner.lock().value.clone()
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.inner.lock().error.clone()
    }

    pub fn loading_count(&self) -> u32 {
        self.inner.lock().loading_count
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().is_loading()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn snapshot(&self) -> ResourceState<V> {
        self.inner.lock().clone()
    }

    /// Receiver bumped after every state transition
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Wait until a fetch for the current key has completed and no other
    /// fetch is in flight
    pub async fn settled(&self) -> ResourceState<V> {
        let mut changes = self.changes();
        loop {
            let snapshot = self.snapshot();
            if snapshot.is_settled() {
                return snapshot;
            }
            if changes.changed().await.is_err() {
                return snapshot;
            }
        }
    }
}
