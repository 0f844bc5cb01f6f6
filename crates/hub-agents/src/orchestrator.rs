//! Static orchestrator: split one prompt into fragments and fan them out
//! round-robin over the configured delegates through the hub's own RPC
//! surface.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RpcCaller, RuntimeCapabilities,
};
use hub_core::error::{HubError, Result};
use hub_core::id;
use hub_core::model::{AgentCard, AgentHealth, Message, Part, Role, Task, TaskState, TaskStatus};

/// Deadline covering an entire fan-out when the caller supplies none.
pub const DEFAULT_ORCHESTRATION_TIMEOUT: Duration = Duration::from_secs(600);

/// History window requested for delegate sub-calls.
pub(crate) const DELEGATE_HISTORY_LENGTH: usize = 10;

pub struct OrchestratorAgent {
    caller: Arc<dyn RpcCaller>,
    delegates: RwLock<Vec<String>>,
    card: AgentCard,
}

impl OrchestratorAgent {
    pub fn new(caller: Arc<dyn RpcCaller>, base_url: &str, delegates: Vec<String>) -> Self {
        let card = AgentCard::new(
            "A2A Orchestrator",
            "Delegates tasks to other local agents",
            format!("{base_url}/agents/orchestrator"),
            "Local",
        );
        OrchestratorAgent {
            caller,
            delegates: RwLock::new(delegates),
            card,
        }
    }

    pub fn delegates(&self) -> Vec<String> {
        match self.delegates.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_delegates(&self, ids: Vec<String>) {
        match self.delegates.write() {
            Ok(mut guard) => *guard = ids,
            Err(poisoned) => *poisoned.into_inner() = ids,
        }
    }
}

/// Split a prompt on the first matching delimiter class: newlines, then
/// semicolons, then the literal infix ` and `.
pub fn split_prompt(prompt: &str) -> Vec<String> {
    let fragments: Vec<String> = if prompt.contains('\n') {
        prompt.split('\n').map(str::to_string).collect()
    } else if prompt.contains(';') {
        prompt.split(';').map(str::to_string).collect()
    } else if prompt.contains(" and ") {
        prompt.split(" and ").map(str::to_string).collect()
    } else {
        vec![prompt.to_string()]
    };
    let compacted: Vec<String> = fragments
        .into_iter()
        .map(|fragment| fragment.trim().to_string())
        .filter(|fragment| !fragment.is_empty())
        .collect();
    if compacted.is_empty() {
        vec![prompt.to_string()]
    } else {
        compacted
    }
}

/// Route one sub-prompt to `agent_id` through `message/send`.
pub(crate) async fn send_to_agent(
    caller: &dyn RpcCaller,
    ctx: &ExecutionContext,
    agent_id: &str,
    text: &str,
    timeout: Option<Duration>,
) -> Result<Task> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("targetAgent".to_string(), json!(agent_id));
    if !ctx.working_dir.trim().is_empty() {
        metadata.insert("workingDirectory".to_string(), json!(ctx.working_dir.trim()));
    }
    let message = Message {
        kind: "message".to_string(),
        message_id: id::new_id("msg"),
        role: Role::User,
        parts: vec![Part::text(text)],
        task_id: None,
        context_id: Some(ctx.context_id.clone()),
        metadata: Some(metadata),
    };
    let mut configuration = serde_json::Map::new();
    configuration.insert("historyLength".to_string(), json!(DELEGATE_HISTORY_LENGTH));
    if let Some(timeout) = timeout {
        configuration.insert("timeout".to_string(), json!(timeout.as_millis() as u64));
    }
    let params = json!({
        "message": message,
        "configuration": configuration,
    });

    let response = caller.call("message/send", params).await?;
    if let Some(error) = response.error {
        return Err(HubError::Execution(error.message));
    }
    let result = response
        .result
        .ok_or_else(|| HubError::Execution("empty response".to_string()))?;
    let task: Task = serde_json::from_value(result)?;
    Ok(task)
}

/// Terminal result wrapping the aggregated reply.
pub(crate) fn aggregated_result(ctx: &ExecutionContext, blocks: Vec<String>) -> ExecutionResult {
    let response = Message::agent_text(&ctx.task_id, &ctx.context_id, blocks.join("\n\n"));
    let mut task = Task::new(&ctx.task_id, &ctx.context_id);
    task.status = TaskStatus {
        state: TaskState::Completed,
        message: Some(response),
        timestamp: chrono::Utc::now(),
    };
    ExecutionResult {
        task,
        artifacts: None,
        final_state: TaskState::Completed,
    }
}

#[async_trait]
impl Agent for OrchestratorAgent {
    fn id(&self) -> &str {
        "orchestrator"
    }

    fn name(&self) -> &str {
        "A2A Orchestrator"
    }

    fn card(&self) -> AgentCard {
        self.card.clone()
    }

    fn capabilities(&self) -> RuntimeCapabilities {
        RuntimeCapabilities::text_only(false)
    }

    async fn check_health(&self) -> Result<AgentHealth> {
        Ok(AgentHealth::healthy(0))
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult> {
        let prompt = ctx.user_message.text();
        if prompt.is_empty() {
            return Err(HubError::EmptyPrompt);
        }
        let delegates = self.delegates();
        if delegates.is_empty() {
            return Err(HubError::NoDelegates);
        }

        let fragments = split_prompt(&prompt);
        let timeout = ctx.timeout.unwrap_or(DEFAULT_ORCHESTRATION_TIMEOUT);
        let deadline = Instant::now() + timeout;
        debug!(
            fragments = fragments.len(),
            delegates = delegates.len(),
            "fanning out prompt"
        );

        let mut blocks = Vec::with_capacity(fragments.len());
        for (index, fragment) in fragments.iter().enumerate() {
            let agent_id = &delegates[index % delegates.len()];
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                blocks.push(format!("{agent_id}: error: deadline exceeded"));
                continue;
            }
            match send_to_agent(self.caller.as_ref(), &ctx, agent_id, fragment, Some(remaining))
                .await
            {
                Ok(task) => blocks.push(format!("{agent_id}: {}", task.result_text())),
                Err(err) => blocks.push(format!("{agent_id}: error: {err}")),
            }
        }

        Ok(aggregated_result(&ctx, blocks))
    }

    fn set_default_config(&self, defaults: AgentDefaults) {
        if let AgentDefaults::OrchestratorDelegates(ids) = defaults {
            self.set_delegates(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::jsonrpc::{Response, RpcError};
    use serde_json::Value;
    use tokio::sync::Mutex;

    #[test]
    fn split_prefers_newlines() {
        assert_eq!(split_prompt("a\nb and c"), vec!["a", "b and c"]);
    }

    #[test]
    fn split_falls_back_to_semicolons() {
        assert_eq!(split_prompt("a; b; c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn split_falls_back_to_and() {
        assert_eq!(split_prompt("build and test"), vec!["build", "test"]);
    }

    #[test]
    fn split_keeps_whole_prompt_without_delimiters() {
        assert_eq!(split_prompt("just one task"), vec!["just one task"]);
    }

    #[test]
    fn split_drops_blank_fragments() {
        assert_eq!(split_prompt("a\n\n\nb"), vec!["a", "b"]);
    }

    /// Caller stub recording the routed sub-prompts.
    struct RecordingCaller {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl RpcCaller for RecordingCaller {
        async fn call(&self, method: &str, params: Value) -> Result<Response> {
            self.calls
                .lock()
                .await
                .push((method.to_string(), params.clone()));
            let text = params["message"]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let target = params["message"]["metadata"]["targetAgent"]
                .as_str()
                .unwrap_or_default();
            let mut task = Task::new("sub-task", "ctx");
            task.status.state = TaskState::Completed;
            task.status.message = Some(Message::agent_text(
                "sub-task",
                "ctx",
                format!("ran {text} on {target}"),
            ));
            Ok(Response::result(serde_json::to_value(task)?, None))
        }
    }

    fn orchestrator(delegates: Vec<&str>) -> (OrchestratorAgent, Arc<RecordingCaller>) {
        let caller = Arc::new(RecordingCaller {
            calls: Mutex::new(Vec::new()),
        });
        let agent = OrchestratorAgent::new(
            caller.clone(),
            "http://127.0.0.1:8080",
            delegates.into_iter().map(String::from).collect(),
        );
        (agent, caller)
    }

    #[tokio::test]
    async fn round_robin_assignment() {
        let (agent, caller) = orchestrator(vec!["x", "y"]);
        let ctx = ExecutionContext::new("t", "c", Message::user_text("a\nb and c"));
        let result = agent.execute(ctx).await.unwrap();

        let calls = caller.calls.lock().await;
        let targets: Vec<&str> = calls
            .iter()
            .map(|(_, params)| {
                params["message"]["metadata"]["targetAgent"]
                    .as_str()
                    .unwrap()
            })
            .collect();
        assert_eq!(targets, vec!["x", "y", "x"]);

        let text = result.task.result_text();
        assert!(text.starts_with("x: ran a on x"));
        assert!(text.contains("y: ran b and c on y"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let (agent, _) = orchestrator(vec!["x"]);
        let ctx = ExecutionContext::new("t", "c", Message::user_text("  "));
        assert!(matches!(
            agent.execute(ctx).await.unwrap_err(),
            HubError::EmptyPrompt
        ));
    }

    #[tokio::test]
    async fn no_delegates_is_rejected() {
        let (agent, _) = orchestrator(vec![]);
        let ctx = ExecutionContext::new("t", "c", Message::user_text("work"));
        assert!(matches!(
            agent.execute(ctx).await.unwrap_err(),
            HubError::NoDelegates
        ));
    }

    #[tokio::test]
    async fn delegate_errors_become_blocks() {
        struct FailingCaller;
        #[async_trait]
        impl RpcCaller for FailingCaller {
            async fn call(&self, _method: &str, _params: Value) -> Result<Response> {
                Ok(Response::error(
                    RpcError::internal("delegate blew up"),
                    None,
                ))
            }
        }
        let agent =
            OrchestratorAgent::new(Arc::new(FailingCaller), "http://b", vec!["x".to_string()]);
        let ctx = ExecutionContext::new("t", "c", Message::user_text("work"));
        let result = agent.execute(ctx).await.unwrap();
        assert_eq!(result.task.result_text(), "x: error: delegate blew up");
    }

    #[tokio::test]
    async fn delegates_push_replaces_the_plan() {
        let (agent, _) = orchestrator(vec!["x"]);
        agent.set_default_config(AgentDefaults::OrchestratorDelegates(vec![
            "y".to_string(),
            "z".to_string(),
        ]));
        assert_eq!(agent.delegates(), vec!["y", "z"]);
    }
}
