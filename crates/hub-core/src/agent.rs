//! The agent capability surface.
//!
//! Every peer on the hub (CLI-backed, orchestrator, or remote)
//! implements [`Agent`]. Orchestrators call back into the hub through the
//! [`RpcCaller`] capability instead of holding the hub itself.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backends::{ClaudeConfig, CodexConfig, GeminiConfig, VibeConfig};
use crate::error::{HubError, Result};
use crate::jsonrpc::Response;
use crate::model::{AgentCard, AgentHealth, Artifact, Message, Task, TaskState};

/// Bound on the stream-event channel between a producing agent and its
/// consumer.
pub const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Everything an agent needs for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub task_id: String,
    pub context_id: String,
    pub user_message: Message,
    pub previous_history: Vec<Message>,
    pub working_dir: String,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>, message: Message) -> Self {
        ExecutionContext {
            task_id: task_id.into(),
            context_id: context_id.into(),
            user_message: message,
            previous_history: Vec::new(),
            working_dir: String::new(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task: Task,
    pub artifacts: Option<Vec<Artifact>>,
    pub final_state: TaskState,
}

impl ExecutionResult {
    /// Completed task whose final message is a single text part.
    pub fn completed_text(ctx: &ExecutionContext, text: impl Into<String>) -> ExecutionResult {
        let message = Message::agent_text(&ctx.task_id, &ctx.context_id, text);
        let mut task = Task::new(&ctx.task_id, &ctx.context_id);
        task.status.state = TaskState::Completed;
        task.status.message = Some(message);
        task.status.timestamp = Utc::now();
        ExecutionResult {
            task,
            artifacts: None,
            final_state: TaskState::Completed,
        }
    }
}

/// Kind tag of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Output,
    Prompt,
    Complete,
    Error,
}

/// One element of a streaming execution: a line of output, an interactive
/// prompt, or the single terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub agent_id: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind, agent_id: &str, task_id: &str) -> StreamEvent {
        StreamEvent {
            kind,
            text: None,
            agent_id: agent_id.to_string(),
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> StreamEvent {
        self.text = Some(text.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StreamEventKind::Complete | StreamEventKind::Error)
    }
}

/// Runtime capability flags, distinct from the declarative card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCapabilities {
    pub supports_streaming: bool,
    pub supports_cancellation: bool,
    pub max_concurrent_tasks: usize,
    pub supported_input_modes: Vec<String>,
    pub supported_output_modes: Vec<String>,
}

impl RuntimeCapabilities {
    pub fn text_only(streaming: bool) -> RuntimeCapabilities {
        RuntimeCapabilities {
            supports_streaming: streaming,
            supports_cancellation: false,
            max_concurrent_tasks: 1,
            supported_input_modes: vec!["text/plain".to_string()],
            supported_output_modes: vec!["text/plain".to_string()],
        }
    }
}

/// Typed settings snapshot pushed into a live agent.
#[derive(Debug, Clone)]
pub enum AgentDefaults {
    Claude(ClaudeConfig),
    Codex(CodexConfig),
    Gemini(GeminiConfig),
    Vibe(VibeConfig),
    OrchestratorDelegates(Vec<String>),
}

/// Capability to route a JSON-RPC call without holding the hub.
#[async_trait]
pub trait RpcCaller: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Response>;
}

/// Uniform interface over one executable or remote peer.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn card(&self) -> AgentCard;

    fn capabilities(&self) -> RuntimeCapabilities {
        RuntimeCapabilities::text_only(false)
    }

    async fn check_health(&self) -> Result<AgentHealth>;

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult>;

    /// Streaming execution over a PTY. Agents that cannot stream keep the
    /// default.
    async fn execute_streaming(
        &self,
        _ctx: ExecutionContext,
        _output: mpsc::Sender<StreamEvent>,
        _input: mpsc::Receiver<String>,
    ) -> Result<()> {
        Err(HubError::Unsupported(format!(
            "agent {} does not support streaming",
            self.id()
        )))
    }

    /// Best-effort in-flight cancel; `Ok(false)` when nothing was stopped.
    async fn cancel(&self, _task_id: &str) -> Result<bool> {
        Ok(false)
    }

    /// Accept a settings snapshot. Agents ignore variants that are not
    /// theirs.
    fn set_default_config(&self, _defaults: AgentDefaults) {}
}

/// Channel pair for one streaming execution.
pub fn stream_channels() -> (
    mpsc::Sender<StreamEvent>,
    mpsc::Receiver<StreamEvent>,
    mpsc::Sender<String>,
    mpsc::Receiver<String>,
) {
    let (event_tx, event_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let (input_tx, input_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    (event_tx, event_rx, input_tx, input_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_text_carries_ids() {
        let ctx = ExecutionContext::new("task-1", "ctx-1", Message::user_text("hi"));
        let result = ExecutionResult::completed_text(&ctx, "done");
        assert_eq!(result.final_state, TaskState::Completed);
        let message = result.task.status.message.unwrap();
        assert_eq!(message.task_id.as_deref(), Some("task-1"));
        assert_eq!(message.context_id.as_deref(), Some("ctx-1"));
        assert_eq!(message.text(), "done");
    }

    #[test]
    fn terminal_events() {
        let complete = StreamEvent::new(StreamEventKind::Complete, "a", "t");
        let output = StreamEvent::new(StreamEventKind::Output, "a", "t");
        assert!(complete.is_terminal());
        assert!(!output.is_terminal());
    }

    #[test]
    fn stream_event_wire_shape() {
        let event = StreamEvent::new(StreamEventKind::Prompt, "claude-code", "task-9")
            .with_text("Proceed? [y/N]");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "prompt");
        assert_eq!(json["agentId"], "claude-code");
        assert_eq!(json["taskId"], "task-9");
    }
}
