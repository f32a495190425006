use std::collections::HashMap;
use std::future::Future;
use tokio::task::JoinHandle;

use crate::resource::KeyedResource;

/// Manages long-running background tasks.
/// Tasks are keyed by ID and aborted on drop.
pub struct BackgroundTaskManager {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a background task
    /// If a task with the same ID already exists, it is cancelled first
    pub fn spawn_task<F>(&mut self, task_id: String, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(handle) = self.tasks.remove(&task_id) {
            handle.abort();
        }

        let handle = tokio::spawn(future);
        self.tasks.insert(task_id, handle);
    }

    /// Fetch `resource` for the current key, then again after every key change.
    ///
    /// Each fetch runs detached so a slow response never delays noticing the
    /// next key; superseded fetches are discarded by the resource itself.
    pub fn watch_resource<K, V>(&mut self, resource: KeyedResource<K, V>)
    where
        K: Clone + PartialEq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let task_id = format!("watch:{}", resource.name());
        let mut keys = resource.source().watch();

        self.spawn_task(task_id, async move {
            loop {
                let has_key = keys.borrow_and_update().is_some();
                if has_key {
                    let resource = resource.clone();
                    tokio::spawn(async move {
                        resource.fetch().await;
                    });
                }
                if keys.changed().await.is_err() {
                    tracing::debug!("{}: key source closed", resource.name());
                    break;
                }
            }
        });
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel all running tasks (used on shutdown)
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

impl Default for BackgroundTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundTaskManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_source::KeySource;
    use std::time::Duration;

    fn doubling(source: &KeySource<u32>) -> KeyedResource<u32, u32> {
        KeyedResource::new("double", source, |key: u32| async move {
            Ok::<_, String>(key * 2)
        })
    }

    #[tokio::test]
    async fn test_watch_fetches_current_key() {
        let source = KeySource::new(Some(4));
        let resource = doubling(&source);
        let mut tasks = BackgroundTaskManager::new();

        tasks.watch_resource(resource.clone());
        let state = tokio::time::timeout(Duration::from_secs(1), resource.settled())
            .await
            .unwrap();

        assert_eq!(state.value, Some(8));
        assert!(tasks.is_running("watch:double"));
    }

    #[tokio::test]
    async fn test_watch_refetches_on_key_change() {
        let source = KeySource::new(None);
        let resource = doubling(&source);
        let mut tasks = BackgroundTaskManager::new();
        tasks.watch_resource(resource.clone());

        source.set(Some(21));
        let state = tokio::time::timeout(Duration::from_secs(1), resource.settled())
            .await
            .unwrap();

        assert_eq!(state.value, Some(42));
    }

    #[tokio::test]
    async fn test_cancel_all_stops_watchers() {
        let source = KeySource::new(None);
        let resource = doubling(&source);
        let mut tasks = BackgroundTaskManager::new();
        tasks.watch_resource(resource);
        assert_eq!(tasks.len(), 1);

        tasks.cancel_all();

        assert!(tasks.is_empty());
        assert!(!tasks.is_running("watch:double"));
    }
}
