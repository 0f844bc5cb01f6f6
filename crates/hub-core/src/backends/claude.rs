//! Claude CLI option set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{override_bool, override_str, override_str_list, parse_closed};
use crate::error::Result;

/// Model alias accepted by the Claude CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClaudeModel {
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "opus")]
    Opus,
    #[serde(rename = "sonnet")]
    Sonnet,
    #[serde(rename = "haiku")]
    Haiku,
}

impl ClaudeModel {
    pub fn parse(value: &str) -> Option<ClaudeModel> {
        match value {
            "" => Some(ClaudeModel::Default),
            "opus" => Some(ClaudeModel::Opus),
            "sonnet" => Some(ClaudeModel::Sonnet),
            "haiku" => Some(ClaudeModel::Haiku),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaudeModel::Default => "",
            ClaudeModel::Opus => "opus",
            ClaudeModel::Sonnet => "sonnet",
            ClaudeModel::Haiku => "haiku",
        }
    }
}

/// Predefined tool restriction profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClaudeToolProfile {
    /// No restriction flag at all.
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "safe")]
    Safe,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "full")]
    Full,
}

impl ClaudeToolProfile {
    pub fn parse(value: &str) -> Option<ClaudeToolProfile> {
        match value {
            "" => Some(ClaudeToolProfile::Default),
            "safe" => Some(ClaudeToolProfile::Safe),
            "normal" => Some(ClaudeToolProfile::Normal),
            "full" => Some(ClaudeToolProfile::Full),
            _ => None,
        }
    }

    /// Tool list for the profile; empty means no `--allowedTools` flag.
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            ClaudeToolProfile::Default | ClaudeToolProfile::Full => &[],
            ClaudeToolProfile::Safe => &["Read", "Glob", "Grep", "LSP"],
            ClaudeToolProfile::Normal => &[
                "Read",
                "Glob",
                "Grep",
                "Edit",
                "Write",
                "LSP",
                "WebFetch",
                "WebSearch",
            ],
        }
    }
}

/// Per-call Claude execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaudeConfig {
    pub r#continue: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub model: ClaudeModel,
    pub tool_profile: ClaudeToolProfile,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
}

impl ClaudeConfig {
    /// Merge a per-call metadata override. Unknown keys are ignored;
    /// closed-set violations fail.
    pub fn apply_override(&mut self, value: &Value) -> Result<()> {
        if let Some(model) = override_str(value, "model") {
            self.model = parse_closed("model", &model, ClaudeModel::parse)?;
        }
        if let Some(profile) = override_str(value, "toolProfile") {
            self.tool_profile = parse_closed("toolProfile", &profile, ClaudeToolProfile::parse)?;
        }
        if let Some(cont) = override_bool(value, "continue") {
            self.r#continue = cont;
        }
        if let Some(session) = override_str(value, "sessionId") {
            self.session_id = session;
        }
        if let Some(tools) = override_str_list(value, "allowedTools") {
            self.allowed_tools = tools;
        }
        Ok(())
    }

    /// Effective tool list: a custom list overrides the profile table.
    pub fn effective_tools(&self) -> Vec<String> {
        if !self.allowed_tools.is_empty() {
            return self.allowed_tools.clone();
        }
        self.tool_profile
            .tools()
            .iter()
            .map(|tool| tool.to_string())
            .collect()
    }
}

/// Persistent Claude defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaudeSettings {
    pub default_model: ClaudeModel,
    pub default_tool_profile: ClaudeToolProfile,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_allowed_tools: Vec<String>,
    pub enable_continue: bool,
}

impl ClaudeSettings {
    pub fn to_config(&self) -> ClaudeConfig {
        ClaudeConfig {
            r#continue: self.enable_continue,
            session_id: String::new(),
            model: self.default_model,
            tool_profile: self.default_tool_profile,
            allowed_tools: self.custom_allowed_tools.clone(),
        }
    }
}
