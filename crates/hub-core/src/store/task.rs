//! Task records with validated state transitions and a durable snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::error::{HubError, Result};
use crate::fsio;
use crate::model::{Artifact, Message, Task, TaskState, TaskStatus};

/// Filters applied by [`TaskStore::list`]; zero `limit` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub context_id: Option<String>,
    pub state: Option<TaskState>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

/// Thread-safe task store. Mutations snapshot the full set and persist it
/// asynchronously; the snapshot write is serialized by its own lock.
pub struct TaskStore {
    inner: Arc<RwLock<Inner>>,
    persist_path: Option<PathBuf>,
    persist_lock: Arc<Mutex<()>>,
}

impl TaskStore {
    pub fn new(persist_path: Option<PathBuf>) -> TaskStore {
        TaskStore {
            inner: Arc::new(RwLock::new(Inner::default())),
            persist_path,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Hydrate from disk. A missing file is fine; a malformed one halts
    /// startup.
    pub async fn load(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let stored: Vec<Task> = serde_json::from_slice(&data)
            .map_err(|err| HubError::Persistence(format!("{}: {err}", path.display())))?;
        let mut inner = self.inner.write().await;
        for task in stored {
            if !inner.tasks.contains_key(&task.id) {
                inner.order.push(task.id.clone());
            }
            inner.tasks.insert(task.id.clone(), task);
        }
        Ok(())
    }

    pub async fn create(&self, task: Task) {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&task.id) {
            inner.order.push(task.id.clone());
        }
        inner.tasks.insert(task.id.clone(), task);
        self.persist_async(&inner);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// Transition a task, stamping a monotonically non-decreasing
    /// timestamp. Terminal tasks reject every update.
    pub async fn update_status(
        &self,
        id: &str,
        state: TaskState,
        message: Option<Message>,
    ) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| HubError::TaskNotFound(id.to_string()))?;
        let current = task.status.state;
        if !current.can_transition_to(state) {
            return Err(HubError::InvalidTransition {
                from: current,
                to: state,
            });
        }
        task.status.state = state;
        task.status.message = message;
        task.status.timestamp = Utc::now().max(task.status.timestamp);
        let updated = task.clone();
        self.persist_async(&inner);
        Ok(updated)
    }

    /// Merge a finished execution into the stored record.
    pub async fn apply_result(
        &self,
        id: &str,
        status: TaskStatus,
        artifacts: Option<Vec<Artifact>>,
    ) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| HubError::TaskNotFound(id.to_string()))?;
        let current = task.status.state;
        if !current.can_transition_to(status.state) {
            return Err(HubError::InvalidTransition {
                from: current,
                to: status.state,
            });
        }
        let floor = task.status.timestamp;
        task.status = status;
        task.status.timestamp = task.status.timestamp.max(floor);
        if artifacts.is_some() {
            task.artifacts = artifacts;
        }
        let updated = task.clone();
        self.persist_async(&inner);
        Ok(updated)
    }

    pub async fn append_history(&self, id: &str, message: Message) -> Result<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| HubError::TaskNotFound(id.to_string()))?;
        task.history.push(message);
        self.persist_async(&inner);
        Ok(())
    }

    /// Snapshot listing in insertion order, filters applied before
    /// pagination.
    pub async fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        let inner = self.inner.read().await;
        let matching: Vec<Task> = inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|task| match &filter.context_id {
                Some(ctx) => &task.context_id == ctx,
                None => true,
            })
            .filter(|task| match filter.state {
                Some(state) => task.status.state == state,
                None => true,
            })
            .cloned()
            .collect();
        if filter.offset >= matching.len() {
            return Vec::new();
        }
        let end = if filter.limit > 0 {
            (filter.offset + filter.limit).min(matching.len())
        } else {
            matching.len()
        };
        matching[filter.offset..end].to_vec()
    }

    /// `(total, active)` counts for the status endpoint.
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        let active = inner
            .tasks
            .values()
            .filter(|task| task.status.state.is_active())
            .count();
        (inner.tasks.len(), active)
    }

    /// Write the current snapshot and wait for it to land.
    pub async fn persist_now(&self) -> Result<()> {
        let Some(path) = self.persist_path.clone() else {
            return Ok(());
        };
        let snapshot = {
            let inner = self.inner.read().await;
            snapshot_of(&inner)
        };
        let _guard = self.persist_lock.lock().await;
        tokio::task::spawn_blocking(move || fsio::write_json_atomic(&path, &snapshot))
            .await
            .map_err(|err| HubError::Internal(err.to_string()))?
    }

    fn persist_async(&self, inner: &Inner) {
        let Some(path) = self.persist_path.clone() else {
            return;
        };
        let snapshot = snapshot_of(inner);
        let lock = self.persist_lock.clone();
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            let result =
                tokio::task::spawn_blocking(move || fsio::write_json_atomic(&path, &snapshot))
                    .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "failed to persist tasks"),
                Err(err) => warn!(error = %err, "task persistence worker panicked"),
            }
        });
    }
}

fn snapshot_of(inner: &Inner) -> Vec<Task> {
    inner
        .order
        .iter()
        .filter_map(|id| inner.tasks.get(id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task(id: &str, context: &str) -> Task {
        Task::new(id, context)
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = TaskStore::new(None);
        store.create(task("t1", "c1")).await;
        let found = store.get("t1").await.unwrap();
        assert_eq!(found.status.state, TaskState::Submitted);
    }

    #[tokio::test]
    async fn update_walks_the_state_machine() {
        let store = TaskStore::new(None);
        store.create(task("t1", "c1")).await;
        store
            .update_status("t1", TaskState::Working, None)
            .await
            .unwrap();
        store
            .update_status("t1", TaskState::Completed, None)
            .await
            .unwrap();
        let err = store
            .update_status("t1", TaskState::Canceled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn timestamps_never_decrease() {
        let store = TaskStore::new(None);
        store.create(task("t1", "c1")).await;
        let first = store
            .update_status("t1", TaskState::Working, None)
            .await
            .unwrap();
        let second = store
            .update_status("t1", TaskState::Completed, None)
            .await
            .unwrap();
        assert!(second.status.timestamp >= first.status.timestamp);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = TaskStore::new(None);
        let err = store
            .update_status("ghost", TaskState::Working, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_and_paginates_in_insertion_order() {
        let store = TaskStore::new(None);
        store.create(task("t1", "c1")).await;
        store.create(task("t2", "c2")).await;
        store.create(task("t3", "c1")).await;

        let all = store.list(&TaskFilter::default()).await;
        assert_eq!(
            all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2", "t3"]
        );

        let c1 = store
            .list(&TaskFilter {
                context_id: Some("c1".to_string()),
                ..TaskFilter::default()
            })
            .await;
        assert_eq!(c1.len(), 2);

        let page = store
            .list(&TaskFilter {
                limit: 1,
                offset: 1,
                ..TaskFilter::default()
            })
            .await;
        assert_eq!(page[0].id, "t2");

        let past_end = store
            .list(&TaskFilter {
                offset: 10,
                ..TaskFilter::default()
            })
            .await;
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");

        let store = TaskStore::new(Some(path.clone()));
        store.create(task("t1", "c1")).await;
        store
            .update_status(
                "t1",
                TaskState::Completed,
                Some(Message::agent_text("t1", "c1", "done")),
            )
            .await
            .unwrap();
        store.persist_now().await.unwrap();

        let reloaded = TaskStore::new(Some(path));
        reloaded.load().await.unwrap();
        let found = reloaded.get("t1").await.unwrap();
        assert_eq!(found.status.state, TaskState::Completed);
        assert_eq!(found.result_text(), "done");
    }

    #[tokio::test]
    async fn malformed_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = TaskStore::new(Some(path));
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, HubError::Persistence(_)));
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(Some(dir.path().join("tasks.json")));
        store.load().await.unwrap();
        assert_eq!(store.counts().await, (0, 0));
    }
}
