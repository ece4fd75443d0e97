//! In-memory task registry: the single source of truth for download state.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::download::task::{MediaType, TaskKind, TaskRecord, TaskState};

/// Concurrent map of task id -> task record.
///
/// Created once at startup and shared behind an `Arc`. Records persist until
/// process restart; there is no eviction (see DESIGN.md). Concurrent
/// `create`/`get`/`list` are safe; mutation goes through `update` and is
/// performed only by the owning worker and the cancel endpoint.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a fresh task id, stores a new `Pending` record, returns the id.
    ///
    /// UUIDs make collisions with existing ids a non-concern for the process
    /// lifetime.
    pub async fn create(&self, url: &str, kind: TaskKind, media_type: MediaType, format_id: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = TaskRecord::new(id.clone(), url.to_string(), kind, media_type, format_id.to_string());

        let mut tasks = self.tasks.write().await;
        tasks.insert(id.clone(), record);
        log::info!("Task {} registered for {}", id, url);
        id
    }

    /// Returns a snapshot of the record, or `None` for an unknown id.
    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        let tasks = self.tasks.read().await;
        tasks.get(task_id).cloned()
    }

    /// Snapshot of all records, for the queue endpoint.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    /// Number of registered tasks.
    pub async fn len(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.len()
    }

    /// Returns true when the registry holds no tasks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mutates a record in place under the write lock.
    ///
    /// Returns false for an unknown id. The closure runs while the lock is
    /// held, so keep it small.
    pub async fn update<F>(&self, task_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(record) => {
                mutate(record);
                true
            }
            None => false,
        }
    }

    /// Flags a task as cancelled if it has not already reached a terminal state.
    ///
    /// Advisory only: the running engine call is not interrupted, and the
    /// worker may later overwrite the flag with `Completed`/`Failed`.
    pub async fn request_cancel(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(record) if !record.state.is_terminal() => {
                record.state = TaskState::Cancelled;
                log::info!("Task {} flagged as cancelled", task_id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = TaskRegistry::new();
        let id = registry
            .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
            .await;

        let record = registry.get(&id).await.expect("record should exist");
        assert_eq!(record.id, id);
        assert_eq!(record.source_url, "http://example.com/v");
        assert_eq!(record.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let registry = TaskRegistry::new();
        assert!(registry.get("no-such-task").await.is_none());
    }

    #[tokio::test]
    async fn test_update_mutates_record() {
        let registry = TaskRegistry::new();
        let id = registry
            .create("http://example.com/v", TaskKind::Single, MediaType::Audio, "best")
            .await;

        let updated = registry
            .update(&id, |record| {
                record.state = TaskState::Downloading;
                record.percent = 42.5;
            })
            .await;
        assert!(updated);

        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.state, TaskState::Downloading);
        assert_eq!(record.percent, 42.5);
    }

    #[tokio::test]
    async fn test_update_unknown_id_returns_false() {
        let registry = TaskRegistry::new();
        assert!(!registry.update("missing", |r| r.percent = 1.0).await);
    }

    #[tokio::test]
    async fn test_cancel_only_non_terminal() {
        let registry = TaskRegistry::new();
        let id = registry
            .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
            .await;

        assert!(registry.request_cancel(&id).await);
        assert_eq!(registry.get(&id).await.unwrap().state, TaskState::Cancelled);

        // Already terminal: second cancel is a no-op
        assert!(!registry.request_cancel(&id).await);
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_distinct_ids() {
        let registry = Arc::new(TaskRegistry::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .create(
                        &format!("http://example.com/{}", i),
                        TaskKind::Single,
                        MediaType::Video,
                        "best",
                    )
                    .await
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 32);
        assert_eq!(registry.len().await, 32);
    }
}
