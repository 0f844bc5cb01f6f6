//! External A2A wire dialect and the field-for-field translation to and
//! from the internal model.
//!
//! The dialect uses `TASK_STATE_*` markers; the internal `unknown` state
//! maps one-way onto `TASK_STATE_UNSPECIFIED`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hub_core::model::{
    FileContent, Message, Part, Role, Task, TaskState, TaskStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialectTaskState {
    #[serde(rename = "TASK_STATE_SUBMITTED")]
    Submitted,
    #[serde(rename = "TASK_STATE_WORKING")]
    Working,
    #[serde(rename = "TASK_STATE_INPUT_REQUIRED")]
    InputRequired,
    #[serde(rename = "TASK_STATE_COMPLETED")]
    Completed,
    #[serde(rename = "TASK_STATE_CANCELLED")]
    Canceled,
    #[serde(rename = "TASK_STATE_FAILED")]
    Failed,
    #[serde(rename = "TASK_STATE_REJECTED")]
    Rejected,
    #[serde(rename = "TASK_STATE_AUTH_REQUIRED")]
    AuthRequired,
    #[serde(rename = "TASK_STATE_UNSPECIFIED")]
    Unspecified,
}

pub fn state_to_external(state: TaskState) -> DialectTaskState {
    match state {
        TaskState::Submitted => DialectTaskState::Submitted,
        TaskState::Working => DialectTaskState::Working,
        TaskState::InputRequired => DialectTaskState::InputRequired,
        TaskState::Completed => DialectTaskState::Completed,
        TaskState::Canceled => DialectTaskState::Canceled,
        TaskState::Failed => DialectTaskState::Failed,
        TaskState::Rejected => DialectTaskState::Rejected,
        TaskState::AuthRequired => DialectTaskState::AuthRequired,
        TaskState::Unknown => DialectTaskState::Unspecified,
    }
}

pub fn state_from_external(state: DialectTaskState) -> TaskState {
    match state {
        DialectTaskState::Submitted => TaskState::Submitted,
        DialectTaskState::Working => TaskState::Working,
        DialectTaskState::InputRequired => TaskState::InputRequired,
        DialectTaskState::Completed => TaskState::Completed,
        DialectTaskState::Canceled => TaskState::Canceled,
        DialectTaskState::Failed => TaskState::Failed,
        DialectTaskState::Rejected => TaskState::Rejected,
        DialectTaskState::AuthRequired => TaskState::AuthRequired,
        DialectTaskState::Unspecified => TaskState::Unknown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DialectPart {
    Text { text: String },
    File { file: DialectFile },
    Data { data: Value },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialectFile {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialectMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<DialectPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialectTaskStatus {
    pub state: DialectTaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<DialectMessage>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialectTask {
    pub id: String,
    pub context_id: String,
    pub status: DialectTaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<DialectMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

pub fn part_to_external(part: &Part) -> DialectPart {
    match part {
        Part::Text { text } => DialectPart::Text { text: text.clone() },
        Part::File { file } => DialectPart::File {
            file: DialectFile {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                bytes: file.bytes.clone(),
                uri: file.uri.clone(),
            },
        },
        Part::Data { data } => DialectPart::Data { data: data.clone() },
    }
}

pub fn part_from_external(part: &DialectPart) -> Part {
    match part {
        DialectPart::Text { text } => Part::Text { text: text.clone() },
        DialectPart::File { file } => Part::File {
            file: FileContent {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                bytes: file.bytes.clone(),
                uri: file.uri.clone(),
            },
        },
        DialectPart::Data { data } => Part::Data { data: data.clone() },
    }
}

pub fn message_to_external(message: &Message) -> DialectMessage {
    DialectMessage {
        id: message.message_id.clone(),
        role: message.role,
        parts: message.parts.iter().map(part_to_external).collect(),
        task_id: message.task_id.clone(),
        context_id: message.context_id.clone(),
        metadata: message.metadata.clone(),
    }
}

pub fn message_from_external(message: &DialectMessage) -> Message {
    Message {
        kind: "message".to_string(),
        message_id: message.id.clone(),
        role: message.role,
        parts: message.parts.iter().map(part_from_external).collect(),
        task_id: message.task_id.clone(),
        context_id: message.context_id.clone(),
        metadata: message.metadata.clone(),
    }
}

pub fn task_to_external(task: &Task) -> DialectTask {
    DialectTask {
        id: task.id.clone(),
        context_id: task.context_id.clone(),
        status: DialectTaskStatus {
            state: state_to_external(task.status.state),
            message: task.status.message.as_ref().map(message_to_external),
            timestamp: task.status.timestamp,
        },
        history: task.history.iter().map(message_to_external).collect(),
        metadata: task.metadata.clone(),
    }
}

pub fn task_from_external(task: &DialectTask) -> Task {
    Task {
        kind: "task".to_string(),
        id: task.id.clone(),
        context_id: task.context_id.clone(),
        status: TaskStatus {
            state: state_from_external(task.status.state),
            message: task.status.message.as_ref().map(message_from_external),
            timestamp: task.status.timestamp,
        },
        history: task.history.iter().map(message_from_external).collect(),
        artifacts: None,
        metadata: task.metadata.clone(),
    }
}
