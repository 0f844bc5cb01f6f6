//! Conversation contexts: append-only message history keyed by id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::error::{HubError, Result};
use crate::fsio;
use crate::model::Message;

/// A context and its ordered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
}

#[derive(Default)]
struct Inner {
    contexts: HashMap<String, ContextRecord>,
    order: Vec<String>,
}

/// Context store. Appends are serialized by the store lock, so insertion
/// order is the only order.
pub struct ContextStore {
    inner: Arc<RwLock<Inner>>,
    persist_path: Option<PathBuf>,
    persist_lock: Arc<Mutex<()>>,
}

impl ContextStore {
    pub fn new(persist_path: Option<PathBuf>) -> ContextStore {
        ContextStore {
            inner: Arc::new(RwLock::new(Inner::default())),
            persist_path,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let stored: Vec<ContextRecord> = serde_json::from_slice(&data)
            .map_err(|err| HubError::Persistence(format!("{}: {err}", path.display())))?;
        let mut inner = self.inner.write().await;
        for record in stored {
            if !inner.contexts.contains_key(&record.id) {
                inner.order.push(record.id.clone());
            }
            inner.contexts.insert(record.id.clone(), record);
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<ContextRecord> {
        self.inner.read().await.contexts.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contexts.contains_key(id)
    }

    pub async fn create(&self, id: &str) -> ContextRecord {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.contexts.get(id) {
            return existing.clone();
        }
        let record = ContextRecord {
            id: id.to_string(),
            created_at: Utc::now(),
            history: Vec::new(),
        };
        inner.order.push(id.to_string());
        inner.contexts.insert(id.to_string(), record.clone());
        self.persist_async(&inner);
        record
    }

    /// Append a message, creating the context lazily.
    pub async fn append_message(&self, id: &str, message: Message) {
        let mut inner = self.inner.write().await;
        if !inner.contexts.contains_key(id) {
            inner.order.push(id.to_string());
            inner.contexts.insert(
                id.to_string(),
                ContextRecord {
                    id: id.to_string(),
                    created_at: Utc::now(),
                    history: Vec::new(),
                },
            );
        }
        if let Some(record) = inner.contexts.get_mut(id) {
            record.history.push(message);
        }
        self.persist_async(&inner);
    }

    /// Full history, or the most recent `limit` messages in order.
    pub async fn history(&self, id: &str, limit: Option<usize>) -> Vec<Message> {
        let inner = self.inner.read().await;
        let Some(record) = inner.contexts.get(id) else {
            return Vec::new();
        };
        match limit {
            Some(limit) if limit > 0 && limit < record.history.len() => {
                record.history[record.history.len() - limit..].to_vec()
            }
            _ => record.history.clone(),
        }
    }

    pub async fn list(&self, limit: Option<usize>) -> Vec<ContextRecord> {
        let inner = self.inner.read().await;
        let records: Vec<ContextRecord> = inner
            .order
            .iter()
            .filter_map(|id| inner.contexts.get(id))
            .cloned()
            .collect();
        match limit {
            Some(limit) if limit > 0 && limit < records.len() => records[..limit].to_vec(),
            _ => records,
        }
    }

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
                Ok(Err(err)) => warn!(error = %err, "failed to persist contexts"),
                Err(err) => warn!(error = %err, "context persistence worker panicked"),
            }
        });
    }
}

fn snapshot_of(inner: &Inner) -> Vec<ContextRecord> {
    inner
        .order
        .iter()
        .filter_map(|id| inner.contexts.get(id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_creates_lazily() {
        let store = ContextStore::new(None);
        store
            .append_message("ctx-1", Message::user_text("hello"))
            .await;
        assert!(store.contains("ctx-1").await);
        assert_eq!(store.history("ctx-1", None).await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_prefix_stable() {
        let store = ContextStore::new(None);
        store.append_message("c", Message::user_text("one")).await;
        let before = store.history("c", None).await;
        store.append_message("c", Message::user_text("two")).await;
        let after = store.history("c", None).await;
        assert_eq!(&after[..before.len()], &before[..]);
    }

    #[tokio::test]
    async fn limited_history_keeps_most_recent_in_order() {
        let store = ContextStore::new(None);
        for text in ["one", "two", "three"] {
            store.append_message("c", Message::user_text(text)).await;
        }
        let recent = store.history("c", Some(2)).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text(), "two");
        assert_eq!(recent[1].text(), "three");
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = ContextStore::new(None);
        let first = store.create("c").await;
        store.append_message("c", Message::user_text("kept")).await;
        let second = store.create("c").await;
        assert_eq!(first.id, second.id);
        assert_eq!(store.history("c", None).await.len(), 1);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contexts.json");

        let store = ContextStore::new(Some(path.clone()));
        store.append_message("c1", Message::user_text("hi")).await;
        store.persist_now().await.unwrap();

        let reloaded = ContextStore::new(Some(path));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.history("c1", None).await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contexts.json");
        std::fs::write(&path, b"[1,2,").unwrap();
        let store = ContextStore::new(Some(path));
        assert!(matches!(
            store.load().await.unwrap_err(),
            HubError::Persistence(_)
        ));
    }
}
