//! Vibe CLI option set.
//!
//! Vibe is configured mostly through its own config files; the CLI only
//! takes a prompt flag, an output format, and an agent profile name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{override_bool, override_str};
use crate::error::Result;

/// Per-call Vibe execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VibeConfig {
    /// Agent profile name; arbitrary string, not a closed set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent: String,
    /// Use `--prompt` instead of the positional flag, with auto-approve.
    pub non_interactive: bool,
    pub auto_approve: bool,
    pub include_history: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
}

impl VibeConfig {
    pub fn apply_override(&mut self, value: &Value) -> Result<()> {
        if let Some(agent) = override_str(value, "agent") {
            self.agent = agent;
        }
        if let Some(non_interactive) = override_bool(value, "nonInteractive") {
            self.non_interactive = non_interactive;
        }
        if let Some(auto_approve) = override_bool(value, "autoApprove") {
            self.auto_approve = auto_approve;
        }
        if let Some(history) = override_bool(value, "includeHistory") {
            self.include_history = history;
        }
        if let Some(prompt) = override_str(value, "systemPrompt") {
            self.system_prompt = prompt;
        }
        Ok(())
    }
}

/// Persistent Vibe defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VibeSettings {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_agent: String,
    pub non_interactive: bool,
    pub auto_approve: bool,
    pub include_history: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_system_prompt: String,
}

impl VibeSettings {
    pub fn to_config(&self) -> VibeConfig {
        VibeConfig {
            agent: self.default_agent.clone(),
            non_interactive: self.non_interactive,
            auto_approve: self.auto_approve,
            include_history: self.include_history,
            system_prompt: self.default_system_prompt.clone(),
        }
    }
}
