//! Hub runtime configuration.

use std::path::PathBuf;

/// Default unix socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/a2a-hub.sock";

/// Default HTTP bind address.
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub path: PathBuf,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ordered delegate ids; empty disables orchestration.
    pub agents: Vec<String>,
    /// Router agent id for LLM-driven routing; `None` keeps the static
    /// splitter.
    pub router: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub socket: SocketConfig,
    pub http: HttpConfig,
    pub orchestrator: OrchestratorConfig,
    pub log_level: String,
    pub data_dir: PathBuf,
}

impl HubConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.http.host, self.http.port)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            socket: SocketConfig {
                path: PathBuf::from(DEFAULT_SOCKET_PATH),
                enabled: true,
            },
            http: HttpConfig {
                enabled: true,
                host: DEFAULT_HTTP_HOST.to_string(),
                port: DEFAULT_HTTP_PORT,
            },
            orchestrator: OrchestratorConfig {
                agents: default_orchestrator_agents(),
                router: None,
            },
            log_level: "info".to_string(),
            data_dir: default_data_dir(),
        }
    }
}

pub fn default_orchestrator_agents() -> Vec<String> {
    ["claude-code", "gemini", "codex", "vibe"]
        .iter()
        .map(|id| id.to_string())
        .collect()
}

/// `$HOME/.a2a-hub`, falling back to the working directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".a2a-hub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_contract() {
        let config = HubConfig::default();
        assert_eq!(config.socket.path, PathBuf::from("/tmp/a2a-hub.sock"));
        assert!(config.socket.enabled);
        assert!(config.http.enabled);
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert_eq!(
            config.orchestrator.agents,
            vec!["claude-code", "gemini", "codex", "vibe"]
        );
    }
}
