//! User-facing sessions: a UI log tied to a context, one file per
//! session under `sessions/<uuid>.json`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::fsio;
use crate::id;

/// Author of a session entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionRole {
    User,
    Agent,
    Error,
    UserInput,
}

/// One line in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub role: SessionRole,
    pub agent: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A session: RFC-4122 v4 id plus the hub context it is linked to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub context_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<SessionEntry>,
}

impl Session {
    /// First eight characters, for compact display.
    pub fn short_id(&self) -> &str {
        if self.id.len() >= 8 {
            &self.id[..8]
        } else {
            &self.id
        }
    }
}

/// Session store. Each session is rewritten atomically on mutation.
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    data_dir: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(data_dir: Option<PathBuf>) -> SessionStore {
        SessionStore {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            data_dir: data_dir.map(|dir| dir.join("sessions")),
        }
    }

    /// Scan the sessions directory. Unreadable or invalid files are
    /// skipped: the session log is a convenience view, not source of
    /// truth.
    pub async fn load(&self) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        fsio::create_dir_all(dir)?;
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut sessions = self.sessions.write().await;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = tokio::fs::read(&path).await else {
                continue;
            };
            match serde_json::from_slice::<Session>(&data) {
                Ok(session) => {
                    sessions.insert(session.id.clone(), session);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping invalid session file");
                }
            }
        }
        Ok(())
    }

    /// Create a session with a fresh uuid and a linked hub context id.
    pub async fn create(&self) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            context_id: id::new_id("ctx"),
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        self.persist(&session).await?;
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// All sessions, most recently updated first.
    pub async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<Session> = sessions.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    pub async fn append_entry(&self, id: &str, entry: SessionEntry) -> Result<Session> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| HubError::Internal(format!("session not found: {id}")))?;
            session.entries.push(entry);
            session.updated_at = Utc::now();
            session.clone()
        };
        self.persist(&session).await?;
        Ok(session)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_none() {
            return Err(HubError::Internal(format!("session not found: {id}")));
        }
        if let Some(dir) = &self.data_dir {
            let _ = tokio::fs::remove_file(dir.join(format!("{id}.json"))).await;
        }
        Ok(())
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.json", session.id));
        let session = session.clone();
        tokio::task::spawn_blocking(move || fsio::write_json_atomic(&path, &session))
            .await
            .map_err(|err| HubError::Internal(err.to_string()))?
    }
}
