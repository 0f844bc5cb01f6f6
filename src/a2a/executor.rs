//! A2A bridge executor: serves the external dialect at `/a2a` by driving
//! the hub's own dispatcher, and emits status-update events
//! (`submitted -> working -> terminal`) onto a queue.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use hub_core::jsonrpc::{Dispatcher, Request, Response, RpcError};
use hub_core::model::Task;

use super::dialect::{
    message_from_external, state_to_external, task_to_external, DialectMessage, DialectTask,
    DialectTaskState,
};
use crate::hub::HubState;

/// One status-update event on the bridge queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub state: DialectTaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<DialectMessage>,
    #[serde(rename = "final")]
    pub is_final: bool,
}

pub struct HubExecutor {
    state: Arc<HubState>,
    dispatcher: Arc<Dispatcher>,
}

impl HubExecutor {
    pub fn new(state: Arc<HubState>, dispatcher: Arc<Dispatcher>) -> HubExecutor {
        HubExecutor { state, dispatcher }
    }

    /// Entry point for the `/a2a` endpoint. Unknown methods fall through
    /// to the regular dispatcher so shared methods keep working.
    pub async fn handle_rpc(&self, request: Request) -> Response {
        match request.method.as_str() {
            "message/send" => {
                let id = request.id.clone();
                let (events_tx, mut events_rx) = mpsc::channel::<StatusUpdateEvent>(16);
                tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        debug!(
                            task_id = %event.task_id,
                            state = ?event.state,
                            "a2a status update"
                        );
                    }
                });
                match self.send_message(request.params.unwrap_or(Value::Null), events_tx).await {
                    Ok(task) => match serde_json::to_value(task) {
                        Ok(value) => Response::result(value, id),
                        Err(err) => Response::error(RpcError::internal(err.to_string()), id),
                    },
                    Err(error) => Response::error(error, id),
                }
            }
            "tasks/get" => {
                let id = request.id.clone();
                let inner = self.dispatcher.handle(request).await;
                translate_task_response(inner, id)
            }
            _ => self.dispatcher.handle(request).await,
        }
    }

    /// Dialect `message/send`: translate inbound, emit lifecycle events,
    /// dispatch through the hub, translate the outcome.
    pub async fn send_message(
        &self,
        params: Value,
        events: mpsc::Sender<StatusUpdateEvent>,
    ) -> Result<DialectTask, RpcError> {
        let message_value = params
            .get("message")
            .cloned()
            .ok_or_else(|| RpcError::invalid_params("message required"))?;
        let dialect_message: DialectMessage = serde_json::from_value(message_value)
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;
        let message = message_from_external(&dialect_message);

        let target = message
            .metadata_str("targetAgent")
            .map(str::to_string)
            .ok_or_else(|| RpcError::invalid_params("metadata.targetAgent required"))?;
        if self.state.registry.get(&target).await.is_none() {
            return Err(RpcError::new(
                hub_core::jsonrpc::codes::AGENT_NOT_FOUND,
                format!("agent not found: {target}"),
            ));
        }

        let context_id = message.context_id.clone().unwrap_or_default();
        let emit = |state, message, is_final| StatusUpdateEvent {
            task_id: String::new(),
            context_id: context_id.clone(),
            state,
            message,
            is_final,
        };
        let _ = events.send(emit(DialectTaskState::Submitted, None, false)).await;
        let _ = events.send(emit(DialectTaskState::Working, None, false)).await;

        let inner_params = json!({
            "message": message,
            "configuration": params.get("configuration").cloned().unwrap_or(json!({})),
        });
        let response = self
            .dispatcher
            .handle(Request::new("message/send", inner_params))
            .await;

        match split_task_result(response) {
            Ok(task) => {
                let external = task_to_external(&task);
                let _ = events
                    .send(StatusUpdateEvent {
                        task_id: external.id.clone(),
                        context_id: external.context_id.clone(),
                        state: external.status.state,
                        message: external.status.message.clone(),
                        is_final: true,
                    })
                    .await;
                Ok(external)
            }
            Err(error) => {
                let _ = events
                    .send(StatusUpdateEvent {
                        task_id: String::new(),
                        context_id,
                        state: state_to_external(hub_core::model::TaskState::Failed),
                        message: None,
                        is_final: true,
                    })
                    .await;
                Err(error)
            }
        }
    }
}

fn split_task_result(response: Response) -> Result<Task, RpcError> {
    if let Some(error) = response.error {
        return Err(error);
    }
    let result = response
        .result
        .ok_or_else(|| RpcError::internal("empty response"))?;
    serde_json::from_value(result).map_err(|err| RpcError::internal(err.to_string()))
}

fn translate_task_response(inner: Response, id: Option<Value>) -> Response {
    match split_task_result(inner) {
        Ok(task) => match serde_json::to_value(task_to_external(&task)) {
            Ok(value) => Response::result(value, id),
            Err(err) => Response::error(RpcError::internal(err.to_string()), id),
        },
        Err(error) => Response::error(error, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubConfig, HubServer};
    use hub_core::agent::{Agent, ExecutionContext, ExecutionResult};
    use hub_core::error::Result as HubResult;
    use hub_core::model::{AgentCard, AgentHealth, Role};
    use async_trait::async_trait;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn id(&self) -> &str {
            "echo"
        }
        fn name(&self) -> &str {
            "Echo"
        }
        fn card(&self) -> AgentCard {
            AgentCard::new("Echo", "echoes", "http://localhost".to_string(), "Test")
        }
        async fn check_health(&self) -> HubResult<AgentHealth> {
            Ok(AgentHealth::healthy(0))
        }
        async fn execute(&self, ctx: ExecutionContext) -> HubResult<ExecutionResult> {
            let text = ctx.user_message.text();
            Ok(ExecutionResult::completed_text(&ctx, format!("echo: {text}")))
        }
    }

    async fn executor_fixture() -> (HubServer, HubExecutor) {
        let mut config = HubConfig::default();
        config.data_dir = tempfile::tempdir().unwrap().keep();
        config.orchestrator.agents = Vec::new();
        let server = HubServer::new(config);
        server.register_handlers();
        server
            .state
            .registry
            .register(Arc::new(EchoAgent))
            .await
            .unwrap();
        let executor = HubExecutor::new(server.state.clone(), server.dispatcher.clone());
        (server, executor)
    }

    fn dialect_send_params(target: &str, text: &str) -> Value {
        json!({
            "message": {
                "id": "m1",
                "role": "user",
                "parts": [{"kind": "text", "text": text}],
                "metadata": {"targetAgent": target},
            }
        })
    }

    #[tokio::test]
    async fn send_emits_lifecycle_events_in_order() {
        let (_server, executor) = executor_fixture().await;
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let task = executor
            .send_message(dialect_send_params("echo", "hello"), events_tx)
            .await
            .unwrap();
        assert_eq!(task.status.state, DialectTaskState::Completed);

        let mut states = Vec::new();
        while let Some(event) = events_rx.recv().await {
            states.push((event.state, event.is_final));
        }
        assert_eq!(
            states,
            vec![
                (DialectTaskState::Submitted, false),
                (DialectTaskState::Working, false),
                (DialectTaskState::Completed, true),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_target_fails_with_agent_not_found() {
        let (_server, executor) = executor_fixture().await;
        let (events_tx, _events_rx) = mpsc::channel(16);
        let error = executor
            .send_message(dialect_send_params("ghost", "hello"), events_tx)
            .await
            .unwrap_err();
        assert_eq!(error.code, hub_core::jsonrpc::codes::AGENT_NOT_FOUND);
    }

    #[tokio::test]
    async fn dialect_reply_uses_external_state_markers() {
        let (_server, executor) = executor_fixture().await;
        let request = Request::new("message/send", dialect_send_params("echo", "hi"));
        let response = executor.handle_rpc(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["status"]["state"], "TASK_STATE_COMPLETED");
        assert_eq!(result["status"]["message"]["role"], "agent");
    }

    #[tokio::test]
    async fn tasks_get_is_translated() {
        let (_server, executor) = executor_fixture().await;
        let (events_tx, _events_rx) = mpsc::channel(16);
        let task = executor
            .send_message(dialect_send_params("echo", "hi"), events_tx)
            .await
            .unwrap();

        let response = executor
            .handle_rpc(Request::new("tasks/get", json!({"id": task.id})))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["status"]["state"], "TASK_STATE_COMPLETED");
    }

    #[test]
    fn user_role_survives_translation() {
        let dialect = DialectMessage {
            id: "m".to_string(),
            role: Role::User,
            parts: vec![],
            task_id: None,
            context_id: None,
            metadata: None,
        };
        assert_eq!(message_from_external(&dialect).role, Role::User);
    }
}
