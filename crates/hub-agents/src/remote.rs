//! Remote A2A peer: proxies the agent capability set to another hub (or
//! any A2A endpoint) described by a fetched card.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use hub_core::agent::{Agent, ExecutionContext, ExecutionResult, RuntimeCapabilities};
use hub_core::error::{HubError, Result};
use hub_core::jsonrpc::{Request, Response};
use hub_core::model::{AgentCard, AgentHealth, Message, Task, TaskState, TaskStatus};

/// Deadline for card fetches and health probes.
const CARD_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteAgent {
    id: String,
    name: String,
    endpoint: String,
    card: RwLock<AgentCard>,
    client: reqwest::Client,
}

impl RemoteAgent {
    /// Connect to a remote peer by fetching its card from
    /// `<endpoint>/.well-known/agent.json`.
    pub async fn connect(id: impl Into<String>, endpoint: impl Into<String>) -> Result<RemoteAgent> {
        let id = id.into();
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::new();
        let card = fetch_card(&client, &endpoint).await?;
        debug!(agent_id = %id, endpoint = %endpoint, "connected to remote peer");
        Ok(RemoteAgent {
            id,
            name: card.name.clone(),
            endpoint,
            card: RwLock::new(card),
            client,
        })
    }

    fn card_snapshot(&self) -> AgentCard {
        match self.card.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn rpc(&self, request: Request, timeout: Option<Duration>) -> Result<Response> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_response = builder
            .send()
            .await
            .map_err(|err| remote_error(&err))?;
        let response: Response = http_response
            .json()
            .await
            .map_err(|err| HubError::Execution(err.to_string()))?;
        Ok(response)
    }
}

fn remote_error(err: &reqwest::Error) -> HubError {
    if err.is_timeout() {
        HubError::Timeout
    } else {
        HubError::Execution(err.to_string())
    }
}

async fn fetch_card(client: &reqwest::Client, endpoint: &str) -> Result<AgentCard> {
    let url = format!("{endpoint}/.well-known/agent.json");
    let response = client
        .get(&url)
        .timeout(CARD_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|err| remote_error(&err))?;
    if !response.status().is_success() {
        return Err(HubError::Execution(format!(
            "card fetch failed: {}",
            response.status()
        )));
    }
    response
        .json::<AgentCard>()
        .await
        .map_err(|err| HubError::Execution(err.to_string()))
}

/// Normalize a remote `message/send` result, either a task or a bare
/// message, into the local task model.
pub fn normalize_send_result(value: serde_json::Value, ctx: &ExecutionContext) -> Result<Task> {
    if value.get("kind").and_then(|kind| kind.as_str()) == Some("task") {
        let task: Task = serde_json::from_value(value)?;
        return Ok(task);
    }
    if value.get("kind").and_then(|kind| kind.as_str()) == Some("message") {
        let mut message: Message = serde_json::from_value(value)?;
        message.task_id = Some(ctx.task_id.clone());
        message.context_id = Some(ctx.context_id.clone());
        let mut task = Task::new(&ctx.task_id, &ctx.context_id);
        task.status = TaskStatus {
            state: TaskState::Completed,
            message: Some(message),
            timestamp: chrono::Utc::now(),
        };
        return Ok(task);
    }
    Err(HubError::Execution(
        "unrecognized remote send result".to_string(),
    ))
}

#[async_trait]
impl Agent for RemoteAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn card(&self) -> AgentCard {
        self.card_snapshot()
    }

    fn capabilities(&self) -> RuntimeCapabilities {
        let card = self.card_snapshot();
        RuntimeCapabilities {
            supports_streaming: card.capabilities.streaming,
            supports_cancellation: true,
            max_concurrent_tasks: 1,
            supported_input_modes: vec!["text/plain".to_string()],
            supported_output_modes: vec!["text/plain".to_string()],
        }
    }

    /// Health is a card refetch under the 5-second deadline.
    async fn check_health(&self) -> Result<AgentHealth> {
        let start = Instant::now();
        match fetch_card(&self.client, &self.endpoint).await {
            Ok(card) => {
                match self.card.write() {
                    Ok(mut guard) => *guard = card,
                    Err(poisoned) => *poisoned.into_inner() = card,
                }
                Ok(AgentHealth::healthy(start.elapsed().as_millis() as i64))
            }
            Err(err) => Ok(AgentHealth::unhealthy(err.to_string())),
        }
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult> {
        let params = json!({
            "message": ctx.user_message,
            "configuration": {
                "timeout": ctx.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            },
        });
        let response = self
            .rpc(Request::new("message/send", params), ctx.timeout)
            .await?;
        if let Some(error) = response.error {
            return Err(HubError::Execution(error.message));
        }
        let result = response
            .result
            .ok_or_else(|| HubError::Execution("empty remote response".to_string()))?;
        let task = normalize_send_result(result, &ctx)?;
        let final_state = task.status.state;
        Ok(ExecutionResult {
            task,
            artifacts: None,
            final_state,
        })
    }

    /// Cancel is forwarded to the remote peer.
    async fn cancel(&self, task_id: &str) -> Result<bool> {
        let response = self
            .rpc(
                Request::new("tasks/cancel", json!({"id": task_id})),
                Some(CARD_FETCH_TIMEOUT),
            )
            .await?;
        if let Some(error) = response.error {
            return Err(HubError::Execution(error.message));
        }
        Ok(response
            .result
            .as_ref()
            .and_then(|result| result.get("canceled"))
            .and_then(|canceled| canceled.as_bool())
            .unwrap_or(false))
    }
}
