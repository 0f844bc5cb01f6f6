//! Durable hub settings: orchestrator plan, last-used agent, and
//! per-backend defaults.
//!
//! Every mutator persists atomically and hands back the refreshed
//! per-agent snapshots so the caller can push them into live agents.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::agent::AgentDefaults;
use crate::backends::{ClaudeSettings, CodexSettings, GeminiSettings, VibeSettings};
use crate::error::{HubError, Result};
use crate::fsio;

/// The persisted settings document (`settings.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub orchestrator_agents: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_agent: String,
    pub claude: ClaudeSettings,
    pub codex: CodexSettings,
    pub gemini: GeminiSettings,
    pub vibe: VibeSettings,
}

impl Settings {
    /// Typed snapshots to push into registered agents, keyed by agent id.
    pub fn agent_defaults(&self) -> Vec<(&'static str, AgentDefaults)> {
        vec![
            ("claude-code", AgentDefaults::Claude(self.claude.to_config())),
            ("codex", AgentDefaults::Codex(self.codex.to_config())),
            ("gemini", AgentDefaults::Gemini(self.gemini.to_config())),
            ("vibe", AgentDefaults::Vibe(self.vibe.to_config())),
            (
                "orchestrator",
                AgentDefaults::OrchestratorDelegates(self.orchestrator_agents.clone()),
            ),
        ]
    }
}

/// Partial update accepted by the settings RPC surface. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub orchestrator_agents: Option<Vec<String>>,
    pub last_agent: Option<String>,
    pub claude: Option<ClaudeSettings>,
    pub codex: Option<CodexSettings>,
    pub gemini: Option<GeminiSettings>,
    pub vibe: Option<VibeSettings>,
}

/// Settings store: a mutex-guarded document; reads return snapshot
/// copies, never shared references.
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn new(path: Option<PathBuf>, initial: Settings) -> SettingsStore {
        SettingsStore {
            inner: Arc::new(RwLock::new(initial)),
            path,
        }
    }

    /// Load from disk. Missing file keeps the construction-time defaults;
    /// malformed content halts startup.
    pub async fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let mut loaded: Settings = serde_json::from_slice(&data)
            .map_err(|err| HubError::Persistence(format!("{}: {err}", path.display())))?;
        let mut inner = self.inner.write().await;
        if loaded.orchestrator_agents.is_empty() {
            loaded.orchestrator_agents = inner.orchestrator_agents.clone();
        }
        *inner = loaded;
        Ok(())
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    pub async fn orchestrator_agents(&self) -> Vec<String> {
        self.inner.read().await.orchestrator_agents.clone()
    }

    pub async fn set_orchestrator_agents(&self, ids: Vec<String>) -> Result<Settings> {
        let snapshot = {
            let mut inner = self.inner.write().await;
            inner.orchestrator_agents = ids;
            inner.clone()
        };
        self.save(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn set_last_agent(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(());
        }
        let snapshot = {
            let mut inner = self.inner.write().await;
            if inner.last_agent == id {
                return Ok(());
            }
            inner.last_agent = id.to_string();
            inner.clone()
        };
        self.save(&snapshot).await
    }

    /// Merge a partial update and persist. Returns the resulting document.
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings> {
        let snapshot = {
            let mut inner = self.inner.write().await;
            if let Some(agents) = update.orchestrator_agents {
                inner.orchestrator_agents = agents;
            }
            if let Some(last) = update.last_agent {
                inner.last_agent = last;
            }
            if let Some(claude) = update.claude {
                inner.claude = claude;
            }
            if let Some(codex) = update.codex {
                inner.codex = codex;
            }
            if let Some(gemini) = update.gemini {
                inner.gemini = gemini;
            }
            if let Some(vibe) = update.vibe {
                inner.vibe = vibe;
            }
            inner.clone()
        };
        self.save(&snapshot).await?;
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Settings) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || fsio::write_json_atomic(&path, &snapshot))
            .await
            .map_err(|err| HubError::Internal(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ClaudeModel;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let initial = Settings {
            orchestrator_agents: vec!["claude-code".to_string()],
            ..Settings::default()
        };
        let store = SettingsStore::new(Some(dir.path().join("settings.json")), initial);
        store.load().await.unwrap();
        assert_eq!(store.orchestrator_agents().await, vec!["claude-code"]);
    }

    #[tokio::test]
    async fn malformed_file_halts_startup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"}{").unwrap();
        let store = SettingsStore::new(Some(path), Settings::default());
        assert!(matches!(
            store.load().await.unwrap_err(),
            HubError::Persistence(_)
        ));
    }

    #[tokio::test]
    async fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(Some(path.clone()), Settings::default());
        store
            .update(SettingsUpdate {
                last_agent: Some("gemini".to_string()),
                claude: Some(ClaudeSettings {
                    default_model: ClaudeModel::Opus,
                    ..ClaudeSettings::default()
                }),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();

        let reloaded = SettingsStore::new(Some(path), Settings::default());
        reloaded.load().await.unwrap();
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.last_agent, "gemini");
        assert_eq!(snapshot.claude.default_model, ClaudeModel::Opus);
    }

    #[tokio::test]
    async fn last_agent_update_is_a_noop_when_unchanged() {
        let store = SettingsStore::new(None, Settings::default());
        store.set_last_agent("codex").await.unwrap();
        store.set_last_agent("  codex  ").await.unwrap();
        assert_eq!(store.snapshot().await.last_agent, "codex");
    }

    #[tokio::test]
    async fn defaults_cover_every_backend_and_the_orchestrator() {
        let settings = Settings::default();
        let ids: Vec<&str> = settings.agent_defaults().iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec!["claude-code", "codex", "gemini", "vibe", "orchestrator"]
        );
    }
}
