use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::key_source::KeySource;
use crate::resource::{KeyedResource, ResourceState};

/// Completes one scripted fetch
pub struct Reply<V>(oneshot::Sender<Result<V, String>>);

impl<V> Reply<V> {
    pub fn ok(self, value: V) {
        let _ = self.0.send(Ok(value));
    }

    pub fn err(self, message: impl Into<String>) {
        let _ = self.0.send(Err(message.into()));
    }
}

/// Fetch function whose calls stay pending until the test answers them.
///
/// Each call takes the next reply queued with [`ScriptedFetch::expect`], in
/// call order. A call with nothing queued fails immediately.
pub struct ScriptedFetch<K, V> {
    calls: Mutex<Vec<K>>,
    pending: Mutex<VecDeque<oneshot::Receiver<Result<V, String>>>>,
}

impl<K, V> ScriptedFetch<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    /// Queue a reply for the next call
    pub fn expect(&self) -> Reply<V> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(rx);
        Reply(tx)
    }

    /// Keys the fetch function was called with, in order
    pub fn calls(&self) -> Vec<K> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fetcher(
        self: &Arc<Self>,
    ) -> impl Fn(K) -> BoxFuture<'static, Result<V, String>> + Send + Sync + 'static {
        let this = self.clone();
        move |key| {
            this.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(key);
            let reply = this
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            async move {
                match reply {
                    Some(rx) => rx
                        .await
                        .unwrap_or_else(|_| Err("reply dropped".to_string())),
                    None => Err("no scripted reply".to_string()),
                }
            }
            .boxed()
        }
    }
}

/// A resource over a scripted fetch, with its key source
pub struct TestResource<K, V> {
    pub source: KeySource<K>,
    pub resource: KeyedResource<K, V>,
    pub fetch: Arc<ScriptedFetch<K, V>>,
}

impl<K, V> TestResource<K, V>
where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(initial: Option<K>) -> Self {
        let source = KeySource::new(initial);
        let fetch = ScriptedFetch::new();
        let resource = KeyedResource::new("test", &source, fetch.fetcher());
        Self {
            source,
            resource,
            fetch,
        }
    }

    pub fn set_key(&self, key: Option<K>) {
        self.source.set(key);
    }

    pub fn state(&self) -> ResourceState<V> {
        self.resource.snapshot()
    }

    pub fn assert_loading(&self, expected: u32) {
        assert_eq!(
            self.resource.loading_count(),
            expected,
            "unexpected loading count"
        );
    }
}
