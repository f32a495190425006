//! Reactive key cell.
//!
//! Observers registered with [`KeySource::subscribe`] are invoked
//! synchronously, in registration order, on every [`KeySource::set`], before
//! the new key is published on the [`watch`] channel. Setting a key equal to
//! the current one is still a change event.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::watch;

/// Notified synchronously whenever the key is set.
///
/// Implementations must not call [`KeySource::set`] on the same source.
pub trait KeyObserver<K>: Send + Sync {
    fn key_changed(&self, key: Option<&K>);
}

struct KeySourceInner<K> {
    current: RwLock<Option<K>>,
    observers: Mutex<Vec<Weak<dyn KeyObserver<K>>>>,
    // Serializes `set` so observers see change events in the order they happened
    serial: Mutex<()>,
    published: watch::Sender<Option<K>>,
}

pub struct KeySource<K> {
    inner: Arc<KeySourceInner<K>>,
}

impl<K> Clone for KeySource<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> KeySource<K>
where
    K: Clone + Send + Sync + 'static,
{
    pub fn new(initial: Option<K>) -> Self {
        let (published, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(KeySourceInner {
                current: RwLock::new(initial),
                observers: Mutex::new(Vec::new()),
                serial: Mutex::new(()),
                published,
            }),
        }
    }

    pub fn current(&self) -> Option<K> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, key: Option<K>) {
        let _serial = self
            .inner
            .serial
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = key.clone();

        for observer in self.live_observers() {
            observer.key_changed(key.as_ref());
        }

        self.inner.published.send_replace(key);
    }

    /// Register `observer`. Only a weak reference is kept; dropped observers
    /// are pruned on the next `set`.
    pub fn subscribe(&self, observer: &Arc<dyn KeyObserver<K>>) {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(observer));
    }

    /// Receiver that sees every key published after observers have run
    pub fn watch(&self) -> watch::Receiver<Option<K>> {
        self.inner.published.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    fn live_observers(&self) -> Vec<Arc<dyn KeyObserver<K>>> {
        let mut observers = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|observer| observer.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl<K> Default for KeySource<K>
where
    K: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<u32>>>,
    }

    impl KeyObserver<u32> for Recorder {
        fn key_changed(&self, key: Option<&u32>) {
            self.seen.lock().unwrap().push(key.copied());
        }
    }

    #[test]
    fn test_set_notifies_observers_for_every_set() {
        let source = KeySource::new(None);
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn KeyObserver<u32>> = recorder.clone();
        source.subscribe(&observer);

        source.set(Some(1));
        source.set(Some(1));
        source.set(None);

        assert_eq!(*recorder.seen.lock().unwrap(), vec![Some(1), Some(1), None]);
        assert_eq!(source.current(), None);
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let source = KeySource::new(Some(7u32));
        let observer: Arc<dyn KeyObserver<u32>> = Arc::new(Recorder::default());
        source.subscribe(&observer);
        assert_eq!(source.observer_count(), 1);

        drop(observer);
        source.set(Some(8));

        assert_eq!(source.observer_count(), 0);
        assert_eq!(source.current(), Some(8));
    }

    #[tokio::test]
    async fn test_watch_sees_key_after_observers() {
        struct SeesOldPublished {
            rx: watch::Receiver<Option<u32>>,
            published_at_call: Mutex<Option<Option<u32>>>,
        }

        impl KeyObserver<u32> for SeesOldPublished {
            fn key_changed(&self, _key: Option<&u32>) {
                *self.published_at_call.lock().unwrap() = Some(*self.rx.borrow());
            }
        }

        let source = KeySource::new(Some(1u32));
        let probe = Arc::new(SeesOldPublished {
            rx: source.watch(),
            published_at_call: Mutex::new(None),
        });
        let observer: Arc<dyn KeyObserver<u32>> = probe.clone();
        source.subscribe(&observer);

        let mut rx = source.watch();
        source.set(Some(2));

        assert_eq!(*probe.published_at_call.lock().unwrap(), Some(Some(1)));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(2));
    }
}
