//! Codex CLI option set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{override_bool, override_str, parse_closed};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodexSandboxMode {
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "workspace-write")]
    WorkspaceWrite,
    #[serde(rename = "danger-full-access")]
    DangerFullAccess,
}

impl CodexSandboxMode {
    pub fn parse(value: &str) -> Option<CodexSandboxMode> {
        match value {
            "" => Some(CodexSandboxMode::Default),
            "read-only" => Some(CodexSandboxMode::ReadOnly),
            "workspace-write" => Some(CodexSandboxMode::WorkspaceWrite),
            "danger-full-access" => Some(CodexSandboxMode::DangerFullAccess),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodexSandboxMode::Default => "",
            CodexSandboxMode::ReadOnly => "read-only",
            CodexSandboxMode::WorkspaceWrite => "workspace-write",
            CodexSandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodexApprovalPolicy {
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "untrusted")]
    Untrusted,
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "on-request")]
    OnRequest,
    #[serde(rename = "never")]
    Never,
}

impl CodexApprovalPolicy {
    pub fn parse(value: &str) -> Option<CodexApprovalPolicy> {
        match value {
            "" => Some(CodexApprovalPolicy::Default),
            "untrusted" => Some(CodexApprovalPolicy::Untrusted),
            "on-failure" => Some(CodexApprovalPolicy::OnFailure),
            "on-request" => Some(CodexApprovalPolicy::OnRequest),
            "never" => Some(CodexApprovalPolicy::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodexApprovalPolicy::Default => "",
            CodexApprovalPolicy::Untrusted => "untrusted",
            CodexApprovalPolicy::OnFailure => "on-failure",
            CodexApprovalPolicy::OnRequest => "on-request",
            CodexApprovalPolicy::Never => "never",
        }
    }
}

/// Per-call Codex execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodexConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub profile: String,
    pub sandbox_mode: CodexSandboxMode,
    pub approval_policy: CodexApprovalPolicy,
    /// Precedes sandbox/approval when set.
    pub full_auto: bool,
    /// Precedes everything, including `full_auto`.
    pub bypass_approvals: bool,
    pub search: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    pub include_history: bool,
}

impl CodexConfig {
    pub fn apply_override(&mut self, value: &Value) -> Result<()> {
        if let Some(model) = override_str(value, "model") {
            self.model = model;
        }
        if let Some(profile) = override_str(value, "profile") {
            self.profile = profile;
        }
        if let Some(mode) = override_str(value, "sandboxMode") {
            self.sandbox_mode = parse_closed("sandboxMode", &mode, CodexSandboxMode::parse)?;
        }
        if let Some(policy) = override_str(value, "approvalPolicy") {
            self.approval_policy =
                parse_closed("approvalPolicy", &policy, CodexApprovalPolicy::parse)?;
        }
        if let Some(full_auto) = override_bool(value, "fullAuto") {
            self.full_auto = full_auto;
        }
        if let Some(bypass) = override_bool(value, "bypassApprovals") {
            self.bypass_approvals = bypass;
        }
        if let Some(search) = override_bool(value, "search") {
            self.search = search;
        }
        if let Some(prompt) = override_str(value, "systemPrompt") {
            self.system_prompt = prompt;
        }
        if let Some(history) = override_bool(value, "includeHistory") {
            self.include_history = history;
        }
        Ok(())
    }
}

/// Persistent Codex defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodexSettings {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_profile: String,
    pub default_sandbox: CodexSandboxMode,
    pub default_approval_policy: CodexApprovalPolicy,
    pub enable_search: bool,
    pub full_auto: bool,
    pub bypass_approvals: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_system_prompt: String,
    pub include_history: bool,
}

impl CodexSettings {
    pub fn to_config(&self) -> CodexConfig {
        CodexConfig {
            model: self.default_model.clone(),
            profile: self.default_profile.clone(),
            sandbox_mode: self.default_sandbox,
            approval_policy: self.default_approval_policy,
            full_auto: self.full_auto,
            bypass_approvals: self.bypass_approvals,
            search: self.enable_search,
            system_prompt: self.default_system_prompt.clone(),
            include_history: self.include_history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sandbox_modes_are_closed() {
        assert_eq!(
            CodexSandboxMode::parse("workspace-write"),
            Some(CodexSandboxMode::WorkspaceWrite)
        );
        assert_eq!(CodexSandboxMode::parse("yolo"), None);
    }

    #[test]
    fn override_rejects_unknown_policy() {
        let mut config = CodexConfig::default();
        let err = config
            .apply_override(&json!({"approvalPolicy": "always"}))
            .unwrap_err();
        assert!(err.to_string().contains("approvalPolicy"));
    }

    #[test]
    fn override_sets_booleans() {
        let mut config = CodexConfig::default();
        config
            .apply_override(&json!({"fullAuto": true, "search": true}))
            .unwrap();
        assert!(config.full_auto);
        assert!(config.search);
    }

    #[test]
    fn settings_roundtrip_to_config() {
        let settings = CodexSettings {
            default_sandbox: CodexSandboxMode::ReadOnly,
            enable_search: true,
            ..CodexSettings::default()
        };
        let config = settings.to_config();
        assert_eq!(config.sandbox_mode, CodexSandboxMode::ReadOnly);
        assert!(config.search);
    }
}
