//! Core data model shared by the hub, the stores, and every agent.
//!
//! Wire names are camelCase and task states are kebab-case, matching the
//! JSON dialect spoken over the socket and HTTP ingresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    Unknown,
}

impl TaskState {
    /// Terminal states are immutable: no further transition is valid.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Canceled | TaskState::Failed | TaskState::Rejected
        )
    }

    /// Whether a task may move from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        !self.is_terminal() && next != TaskState::Submitted
    }

    /// Counts toward the hub's active-task gauge.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskState::Submitted | TaskState::Working | TaskState::InputRequired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::AuthRequired => "auth-required",
            TaskState::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<TaskState> {
        match value {
            "submitted" => Some(TaskState::Submitted),
            "working" => Some(TaskState::Working),
            "input-required" => Some(TaskState::InputRequired),
            "completed" => Some(TaskState::Completed),
            "canceled" => Some(TaskState::Canceled),
            "failed" => Some(TaskState::Failed),
            "rejected" => Some(TaskState::Rejected),
            "auth-required" => Some(TaskState::AuthRequired),
            "unknown" => Some(TaskState::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// One element of a message: text, a file reference, or free-form data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    File { file: FileContent },
    Data { data: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Part {
        Part::Text { text: text.into() }
    }
}

/// File payload carried inline (`bytes`) or by reference (`uri`), never both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A single conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub kind: String,
    pub message_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Message {
        Message {
            kind: "message".to_string(),
            message_id: id::new_id("msg"),
            role: Role::User,
            parts: vec![Part::text(text)],
            task_id: None,
            context_id: None,
            metadata: None,
        }
    }

    /// Agent reply carrying the ids of the task it belongs to.
    pub fn agent_text(task_id: &str, context_id: &str, text: impl Into<String>) -> Message {
        Message {
            kind: "message".to_string(),
            message_id: format!("resp-{task_id}"),
            role: Role::Agent,
            parts: vec![Part::text(text)],
            task_id: Some(task_id.to_string()),
            context_id: Some(context_id.to_string()),
            metadata: None,
        }
    }

    /// Joined text content of all text parts, trimmed.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n").trim().to_string()
    }

    /// String-valued metadata entry, if present and non-blank.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Status snapshot of a task: state, optional final message, timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn now(state: TaskState) -> TaskStatus {
        TaskStatus {
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }
}

/// One execution attempt within a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub kind: String,
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>) -> Task {
        Task {
            kind: "task".to_string(),
            id: id.into(),
            context_id: context_id.into(),
            status: TaskStatus::now(TaskState::Submitted),
            history: Vec::new(),
            artifacts: None,
            metadata: None,
        }
    }

    /// Text of the final status message, or the state name when absent.
    pub fn result_text(&self) -> String {
        match &self.status.message {
            Some(message) => message.text(),
            None => self.status.state.to_string(),
        }
    }
}

/// Named output produced by an agent alongside its final message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Declarative description of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub protocol_version: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub provider: Provider,
    pub skills: Vec<Skill>,
    pub capabilities: AgentCapabilities,
}

impl AgentCard {
    pub fn new(name: &str, description: &str, url: String, provider: &str) -> AgentCard {
        AgentCard {
            protocol_version: "1.0".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            url,
            version: "1.0.0".to_string(),
            provider: Provider {
                name: provider.to_string(),
                url: None,
            },
            skills: Vec::new(),
            capabilities: AgentCapabilities::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_modes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

/// Outcome of the most recent health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentHealth {
    pub fn healthy(latency_ms: i64) -> AgentHealth {
        AgentHealth {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            latency_ms: Some(latency_ms),
            error_message: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> AgentHealth {
        AgentHealth {
            status: HealthStatus::Unhealthy,
            last_check: Utc::now(),
            latency_ms: None,
            error_message: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_immutable() {
        for state in [
            TaskState::Completed,
            TaskState::Canceled,
            TaskState::Failed,
            TaskState::Rejected,
        ] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(TaskState::Working));
            assert!(!state.can_transition_to(TaskState::Canceled));
        }
    }

    #[test]
    fn submitted_reaches_every_terminal_state() {
        for state in [
            TaskState::Completed,
            TaskState::Canceled,
            TaskState::Failed,
            TaskState::Rejected,
        ] {
            assert!(TaskState::Submitted.can_transition_to(state));
            assert!(TaskState::Working.can_transition_to(state));
        }
    }

    #[test]
    fn no_transition_back_to_submitted() {
        assert!(!TaskState::Working.can_transition_to(TaskState::Submitted));
    }

    #[test]
    fn task_state_wire_names_are_kebab_case() {
        let json = serde_json::to_string(&TaskState::InputRequired).unwrap();
        assert_eq!(json, "\"input-required\"");
        let parsed: TaskState = serde_json::from_str("\"auth-required\"").unwrap();
        assert_eq!(parsed, TaskState::AuthRequired);
    }

    #[test]
    fn message_text_joins_text_parts() {
        let mut message = Message::user_text("first");
        message.parts.push(Part::Data {
            data: serde_json::json!({"ignored": true}),
        });
        message.parts.push(Part::text("second"));
        assert_eq!(message.text(), "first\nsecond");
    }

    #[test]
    fn message_text_trims_whitespace() {
        let message = Message::user_text("   \n\t  ");
        assert_eq!(message.text(), "");
    }

    #[test]
    fn part_serialization_is_kind_tagged() {
        let part = Part::File {
            file: FileContent {
                name: "report.txt".to_string(),
                mime_type: "text/plain".to_string(),
                bytes: None,
                uri: Some("file:///tmp/report.txt".to_string()),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["file"]["mimeType"], "text/plain");
        assert!(json["file"].get("bytes").is_none());
    }

    #[test]
    fn task_roundtrips_through_json() {
        let mut task = Task::new("task-1", "ctx-1");
        task.history.push(Message::user_text("hello"));
        task.status = TaskStatus {
            state: TaskState::Completed,
            message: Some(Message::agent_text("task-1", "ctx-1", "done")),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn metadata_str_ignores_blank_values() {
        let mut message = Message::user_text("hi");
        let mut meta = Map::new();
        meta.insert("targetAgent".to_string(), Value::String("  ".to_string()));
        message.metadata = Some(meta);
        assert!(message.metadata_str("targetAgent").is_none());
    }
}
