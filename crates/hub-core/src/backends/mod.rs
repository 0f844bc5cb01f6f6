//! Per-backend option sets.
//!
//! Each CLI backend has a closed enumeration of recognized option values,
//! a per-call config, and a persistent settings struct. Metadata overrides
//! ignore unknown keys but reject closed-set values outside the
//! enumeration.

mod claude;
mod codex;
mod gemini;
mod vibe;

pub use claude::{ClaudeConfig, ClaudeModel, ClaudeSettings, ClaudeToolProfile};
pub use codex::{CodexApprovalPolicy, CodexConfig, CodexSandboxMode, CodexSettings};
pub use gemini::{GeminiApprovalMode, GeminiConfig, GeminiSettings};
pub use vibe::{VibeConfig, VibeSettings};

use serde_json::Value;

use crate::error::{HubError, Result};

pub(crate) fn override_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

pub(crate) fn override_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub(crate) fn override_str_list(value: &Value, key: &str) -> Option<Vec<String>> {
    let items = value.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.to_string())
            .collect(),
    )
}

pub(crate) fn closed_set_error(key: &str, value: &str) -> HubError {
    HubError::InvalidParams(format!("unknown {key} value: {value}"))
}

/// Parse a closed-set value, mapping failures to `InvalidParams`.
pub(crate) fn parse_closed<T>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    parse(value).ok_or_else(|| closed_set_error(key, value))
}
