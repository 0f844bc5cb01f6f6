//! Gemini CLI option set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{override_bool, override_str, parse_closed};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiApprovalMode {
    #[serde(rename = "")]
    #[default]
    Unset,
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "auto_edit")]
    AutoEdit,
    #[serde(rename = "yolo")]
    Yolo,
}

impl GeminiApprovalMode {
    pub fn parse(value: &str) -> Option<GeminiApprovalMode> {
        match value {
            "" => Some(GeminiApprovalMode::Unset),
            "default" => Some(GeminiApprovalMode::Default),
            "auto_edit" => Some(GeminiApprovalMode::AutoEdit),
            "yolo" => Some(GeminiApprovalMode::Yolo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeminiApprovalMode::Unset => "",
            GeminiApprovalMode::Default => "default",
            GeminiApprovalMode::AutoEdit => "auto_edit",
            GeminiApprovalMode::Yolo => "yolo",
        }
    }
}

/// Per-call Gemini execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub sandbox: bool,
    pub approval_mode: GeminiApprovalMode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resume: String,
}

impl GeminiConfig {
    pub fn apply_override(&mut self, value: &Value) -> Result<()> {
        if let Some(model) = override_str(value, "model") {
            self.model = model;
        }
        if let Some(sandbox) = override_bool(value, "sandbox") {
            self.sandbox = sandbox;
        }
        if let Some(mode) = override_str(value, "approvalMode") {
            self.approval_mode = parse_closed("approvalMode", &mode, GeminiApprovalMode::parse)?;
        }
        if let Some(resume) = override_str(value, "resume") {
            self.resume = resume;
        }
        Ok(())
    }
}

/// Persistent Gemini defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiSettings {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_model: String,
    pub default_sandbox: bool,
    pub default_approval_mode: GeminiApprovalMode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resume_session: String,
}

impl GeminiSettings {
    pub fn to_config(&self) -> GeminiConfig {
        GeminiConfig {
            model: self.default_model.clone(),
            sandbox: self.default_sandbox,
            approval_mode: self.default_approval_mode,
            resume: self.resume_session.clone(),
        }
    }
}
