//! The hub server: wires registry, stores, and dispatcher together and
//! implements the RPC method set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hub_core::agent::{Agent, ExecutionContext, RpcCaller};
use hub_core::error::{HubError, Result};
use hub_core::id;
use hub_core::jsonrpc::{Dispatcher, RpcError};
use hub_core::model::{
    AgentCard, AgentCapabilities, HealthStatus, Message, Task, TaskState,
};
use hub_core::registry::AgentRegistry;
use hub_core::store::{
    ContextStore, SessionEntry, SessionRole, SessionStore, Settings, SettingsStore, SettingsUpdate,
    TaskFilter, TaskStore,
};

use hub_agents::{
    ClaudeAgent, CodexAgent, GeminiAgent, LlmOrchestratorAgent, OrchestratorAgent, RemoteAgent,
    VibeAgent,
};

use super::caller::LocalCaller;
use super::config::HubConfig;

/// Default history window handed to agents when the caller does not set
/// one.
const DEFAULT_HISTORY_LENGTH: usize = 10;

/// Shared state behind every RPC handler.
pub struct HubState {
    pub config: HubConfig,
    pub registry: Arc<AgentRegistry>,
    pub tasks: Arc<TaskStore>,
    pub contexts: Arc<ContextStore>,
    pub sessions: Arc<SessionStore>,
    pub settings: Arc<SettingsStore>,
    started_at: Instant,
}

impl HubState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// The hub's own card, served from `/.well-known/agent.json`.
    pub fn hub_card(&self, base_url: &str) -> AgentCard {
        let mut card = AgentCard::new(
            "A2A Local Hub",
            "Local multi-agent hub",
            base_url.to_string(),
            "Local",
        );
        card.capabilities = AgentCapabilities {
            streaming: true,
            push_notifications: false,
            state_transition_history: false,
        };
        card
    }

    /// Push the current settings snapshots into the live agents.
    pub async fn apply_settings_to_agents(&self) {
        let snapshot = self.settings.snapshot().await;
        for (agent_id, defaults) in snapshot.agent_defaults() {
            if let Some(entry) = self.registry.get(agent_id).await {
                entry.agent.set_default_config(defaults);
            }
        }
    }
}

/// The hub server. Owns the lifecycle; shutdown is idempotent and
/// releases resources in reverse order of acquisition.
pub struct HubServer {
    pub state: Arc<HubState>,
    pub dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl HubServer {
    pub fn new(config: HubConfig) -> HubServer {
        let data_dir = config.data_dir.clone();
        let initial_settings = Settings {
            orchestrator_agents: config.orchestrator.agents.clone(),
            ..Settings::default()
        };
        let state = Arc::new(HubState {
            registry: Arc::new(AgentRegistry::new()),
            tasks: Arc::new(TaskStore::new(Some(data_dir.join("tasks.json")))),
            contexts: Arc::new(ContextStore::new(Some(data_dir.join("contexts.json")))),
            sessions: Arc::new(SessionStore::new(Some(data_dir.clone()))),
            settings: Arc::new(SettingsStore::new(
                Some(data_dir.join("settings.json")),
                initial_settings,
            )),
            started_at: Instant::now(),
            config,
        });
        HubServer {
            state,
            dispatcher: Arc::new(Dispatcher::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token tripped once on shutdown; transports watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Construct one CLI specialization per known backend, prepend an
    /// orchestrator when delegates are configured, and register them.
    pub async fn init_agents(&self, base_url: &str) -> Result<()> {
        let caller: Arc<dyn RpcCaller> = Arc::new(LocalCaller::new(self.dispatcher.clone()));
        let delegates = self.state.settings.orchestrator_agents().await;

        let mut agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(ClaudeAgent::new(base_url)),
            Arc::new(GeminiAgent::new(base_url)),
            Arc::new(CodexAgent::new(base_url)),
            Arc::new(VibeAgent::new(base_url)),
        ];
        if !delegates.is_empty() {
            let orchestrator: Arc<dyn Agent> = match &self.state.config.orchestrator.router {
                Some(router) if !router.trim().is_empty() => Arc::new(LlmOrchestratorAgent::new(
                    caller.clone(),
                    base_url,
                    delegates.clone(),
                    router,
                )),
                _ => Arc::new(OrchestratorAgent::new(
                    caller.clone(),
                    base_url,
                    delegates.clone(),
                )),
            };
            agents.insert(0, orchestrator);
        }

        for agent in agents {
            let agent_id = agent.id().to_string();
            if let Err(err) = self.state.registry.register(agent).await {
                warn!(agent_id = %agent_id, error = %err, "failed to register agent");
            }
        }
        self.state.apply_settings_to_agents().await;
        Ok(())
    }

    /// Hydrate settings, contexts, tasks, and sessions from the data
    /// directory.
    pub async fn load_state(&self) -> Result<()> {
        hub_core::fsio::create_dir_all(&self.state.config.data_dir)?;
        self.state.settings.load().await?;
        self.state.apply_settings_to_agents().await;
        self.state.contexts.load().await?;
        self.state.tasks.load().await?;
        self.state.sessions.load().await?;
        Ok(())
    }

    pub fn pid_file(&self) -> std::path::PathBuf {
        self.state.config.data_dir.join("hub.pid")
    }

    pub fn write_pid(&self) -> Result<()> {
        let pid = std::process::id().to_string();
        hub_core::fsio::write_atomic(&self.pid_file(), pid.as_bytes())
    }

    pub fn remove_pid(&self) {
        let _ = std::fs::remove_file(self.pid_file());
    }

    pub fn start_health_checks(&self, interval: Duration) {
        self.state.registry.start_health_checks(interval);
    }

    /// Idempotent shutdown: trip the token, stop the health sweep, flush
    /// the stores, remove the pid file.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("shutting down hub");
        self.shutdown.cancel();
        self.state.registry.stop();
        if let Err(err) = self.state.tasks.persist_now().await {
            warn!(error = %err, "failed to flush tasks");
        }
        if let Err(err) = self.state.contexts.persist_now().await {
            warn!(error = %err, "failed to flush contexts");
        }
        self.remove_pid();
    }

    /// Install the RPC method set.
    pub fn register_handlers(&self) {
        macro_rules! handler {
            ($method:expr, $fn:path) => {
                let state = self.state.clone();
                self.dispatcher.register($method, move |params| {
                    let state = state.clone();
                    async move { $fn(state, params).await.map_err(RpcError::from) }
                });
            };
        }
        handler!("hub/status", handle_status);
        handler!("hub/agents/list", handle_agents_list);
        handler!("hub/agents/get", handle_agents_get);
        handler!("hub/agents/health", handle_agents_health);
        handler!("hub/agents/connect", handle_agents_connect);
        handler!("hub/tasks/list", handle_tasks_list);
        handler!("hub/contexts/list", handle_contexts_list);
        handler!("message/send", handle_message_send);
        handler!("tasks/get", handle_task_get);
        handler!("tasks/cancel", handle_task_cancel);
        handler!("hub/sessions/create", handle_session_create);
        handler!("hub/sessions/list", handle_sessions_list);
        handler!("hub/sessions/get", handle_session_get);
        handler!("hub/sessions/append", handle_session_append);
        handler!("hub/sessions/delete", handle_session_delete);
        handler!("hub/settings/get", handle_settings_get);
        handler!("hub/settings/update", handle_settings_update);
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|err| HubError::InvalidParams(err.to_string()))
}

async fn handle_status(state: Arc<HubState>, _params: Value) -> Result<Value> {
    let agents = state.registry.list().await;
    let mut healthy = 0usize;
    let mut degraded = 0usize;
    let mut unhealthy = 0usize;
    let mut unknown = 0usize;
    let mut agent_entries = Vec::with_capacity(agents.len());
    for entry in &agents {
        match entry.health.status {
            HealthStatus::Healthy => healthy += 1,
            HealthStatus::Degraded => degraded += 1,
            HealthStatus::Unhealthy => unhealthy += 1,
            HealthStatus::Unknown => unknown += 1,
        }
        agent_entries.push(json!({
            "id": entry.agent.id(),
            "name": entry.agent.name(),
            "status": entry.health.status,
        }));
    }
    let (total_tasks, active_tasks) = state.tasks.counts().await;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime_secs(),
        "agents": agent_entries,
        "total": agents.len(),
        "healthy": healthy,
        "degraded": degraded,
        "unhealthy": unhealthy,
        "unknown": unknown,
        "totalTasks": total_tasks,
        "activeTasks": active_tasks,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AgentsListParams {
    include_health: bool,
}

async fn handle_agents_list(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: AgentsListParams = if params.is_null() {
        AgentsListParams::default()
    } else {
        parse_params(params).unwrap_or_default()
    };
    let agents = state.registry.list().await;
    let mut entries = Vec::with_capacity(agents.len());
    for entry in agents {
        let mut item = json!({
            "id": entry.agent.id(),
            "name": entry.agent.name(),
            "card": entry.card,
            "registeredAt": entry.registered_at,
        });
        if request.include_health {
            item["health"] = serde_json::to_value(&entry.health)?;
        }
        entries.push(item);
    }
    Ok(Value::Array(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentIdParams {
    agent_id: String,
}

async fn handle_agents_get(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: AgentIdParams = parse_params(params)?;
    if request.agent_id.is_empty() {
        return Err(HubError::InvalidParams("agentId required".to_string()));
    }
    let entry = state
        .registry
        .get(&request.agent_id)
        .await
        .ok_or(HubError::AgentNotFound(request.agent_id))?;
    Ok(json!({
        "id": entry.agent.id(),
        "name": entry.agent.name(),
        "card": entry.card,
        "health": entry.health,
        "registeredAt": entry.registered_at,
    }))
}

/// On-demand probe: refresh and return the agent's health.
async fn handle_agents_health(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: AgentIdParams = parse_params(params)?;
    if request.agent_id.is_empty() {
        return Err(HubError::InvalidParams("agentId required".to_string()));
    }
    let health = state
        .registry
        .refresh_health(&request.agent_id)
        .await
        .ok_or(HubError::AgentNotFound(request.agent_id))?;
    Ok(serde_json::to_value(health)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRemoteParams {
    agent_id: String,
    url: String,
}

/// Discover an external A2A peer by its card and register it so it is
/// addressable like any local agent.
async fn handle_agents_connect(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: ConnectRemoteParams = parse_params(params)?;
    if request.agent_id.trim().is_empty() || request.url.trim().is_empty() {
        return Err(HubError::InvalidParams(
            "agentId and url required".to_string(),
        ));
    }
    let agent = RemoteAgent::connect(request.agent_id.trim(), request.url.trim()).await?;
    state.registry.register(Arc::new(agent)).await?;
    Ok(json!({"connected": true}))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TasksListParams {
    context_id: Option<String>,
    state: Option<String>,
    limit: usize,
    offset: usize,
}

async fn handle_tasks_list(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: TasksListParams = if params.is_null() {
        TasksListParams::default()
    } else {
        parse_params(params)?
    };
    let state_filter = match request.state.as_deref() {
        None | Some("") => None,
        Some(value) => Some(
            TaskState::parse(value)
                .ok_or_else(|| HubError::InvalidParams(format!("unknown state: {value}")))?,
        ),
    };
    let filter = TaskFilter {
        context_id: request.context_id.filter(|ctx| !ctx.is_empty()),
        state: state_filter,
        limit: request.limit,
        offset: request.offset,
    };
    Ok(serde_json::to_value(state.tasks.list(&filter).await)?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContextsListParams {
    limit: Option<usize>,
}

async fn handle_contexts_list(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: ContextsListParams = if params.is_null() {
        ContextsListParams::default()
    } else {
        parse_params(params)?
    };
    let contexts = state.contexts.list(request.limit).await;
    let entries: Vec<Value> = contexts
        .iter()
        .map(|ctx| json!({"id": ctx.id, "createdAt": ctx.created_at}))
        .collect();
    Ok(Value::Array(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendParams {
    message: Message,
    #[serde(default)]
    configuration: SendConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SendConfiguration {
    history_length: Option<usize>,
    #[serde(rename = "timeout")]
    timeout_ms: Option<u64>,
    #[serde(rename = "workingDirectory")]
    working_dir: Option<String>,
}

fn working_dir_from_metadata(message: &Message) -> String {
    for key in ["workingDirectory", "workingDir", "cwd"] {
        if let Some(dir) = message.metadata_str(key) {
            return dir.to_string();
        }
    }
    String::new()
}

async fn handle_message_send(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: SendParams = parse_params(params)?;
    let mut message = request.message;
    if message.kind != "message" {
        return Err(HubError::InvalidParams("message required".to_string()));
    }
    let Some(agent_id) = message.metadata_str("targetAgent").map(str::to_string) else {
        return Err(HubError::InvalidParams(
            "metadata.targetAgent required".to_string(),
        ));
    };
    let entry = state
        .registry
        .get(&agent_id)
        .await
        .ok_or_else(|| HubError::AgentNotFound(agent_id.clone()))?;

    let context_id = match message.context_id.as_deref() {
        Some(ctx) if !ctx.is_empty() => ctx.to_string(),
        _ => id::new_id("ctx"),
    };
    if !state.contexts.contains(&context_id).await {
        state.contexts.create(&context_id).await;
    }

    let task_id = id::new_id("task");
    message.task_id = Some(task_id.clone());
    message.context_id = Some(context_id.clone());

    let history_length = request
        .configuration
        .history_length
        .unwrap_or(DEFAULT_HISTORY_LENGTH);
    let previous_history = state
        .contexts
        .history(&context_id, Some(history_length))
        .await;
    state
        .contexts
        .append_message(&context_id, message.clone())
        .await;

    let mut task = Task::new(&task_id, &context_id);
    let mut task_meta = serde_json::Map::new();
    task_meta.insert("targetAgent".to_string(), json!(agent_id));
    task.metadata = Some(task_meta);
    task.history.push(message.clone());
    state.tasks.create(task).await;
    state
        .tasks
        .update_status(&task_id, TaskState::Working, None)
        .await?;

    let working_dir = match request.configuration.working_dir.as_deref() {
        Some(dir) if !dir.trim().is_empty() => dir.trim().to_string(),
        _ => working_dir_from_metadata(&message),
    };
    let timeout = request
        .configuration
        .timeout_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);

    if let Err(err) = state.settings.set_last_agent(&agent_id).await {
        warn!(error = %err, "failed to save last agent");
    }

    let ctx = ExecutionContext {
        task_id: task_id.clone(),
        context_id: context_id.clone(),
        user_message: message,
        previous_history,
        working_dir,
        timeout,
        cancel: CancellationToken::new(),
    };

    match entry.agent.execute(ctx).await {
        Ok(result) => {
            let mut status = result.task.status;
            if let Some(reply) = &mut status.message {
                reply.task_id = Some(task_id.clone());
                reply.context_id = Some(context_id.clone());
            }
            if let Some(reply) = &status.message {
                state.contexts.append_message(&context_id, reply.clone()).await;
            }
            let updated = match state
                .tasks
                .apply_result(&task_id, status, result.artifacts)
                .await
            {
                Ok(task) => task,
                // The task left `working` concurrently (e.g. canceled);
                // the child's output is discarded.
                Err(HubError::InvalidTransition { .. }) => state
                    .tasks
                    .get(&task_id)
                    .await
                    .ok_or_else(|| HubError::TaskNotFound(task_id.clone()))?,
                Err(err) => return Err(err),
            };
            Ok(serde_json::to_value(updated)?)
        }
        Err(err) => {
            let failure = Message {
                message_id: format!("error-{task_id}"),
                ..Message::agent_text(&task_id, &context_id, err.to_string())
            };
            if let Err(update_err) = state
                .tasks
                .update_status(&task_id, TaskState::Failed, Some(failure))
                .await
            {
                warn!(task_id = %task_id, error = %update_err, "failed to record task failure");
            }
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskIdParams {
    id: String,
}

async fn handle_task_get(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: TaskIdParams = parse_params(params)?;
    if request.id.is_empty() {
        return Err(HubError::InvalidParams("id required".to_string()));
    }
    let task = state
        .tasks
        .get(&request.id)
        .await
        .ok_or(HubError::TaskNotFound(request.id))?;
    Ok(serde_json::to_value(task)?)
}

async fn handle_task_cancel(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: TaskIdParams = parse_params(params)?;
    if request.id.is_empty() {
        return Err(HubError::InvalidParams("id required".to_string()));
    }
    let task = state
        .tasks
        .get(&request.id)
        .await
        .ok_or_else(|| HubError::TaskNotFound(request.id.clone()))?;
    if task.status.state.is_terminal() {
        return Err(HubError::TaskNotCancelable(request.id));
    }

    // Best-effort in-flight cancel; the task transitions regardless.
    let target = task
        .metadata
        .as_ref()
        .and_then(|meta| meta.get("targetAgent"))
        .and_then(Value::as_str);
    if let Some(agent_id) = target {
        if let Some(entry) = state.registry.get(agent_id).await {
            match entry.agent.cancel(&task.id).await {
                Ok(true) => info!(task_id = %task.id, "agent canceled in-flight execution"),
                Ok(false) => {}
                Err(err) => warn!(task_id = %task.id, error = %err, "agent cancel failed"),
            }
        }
    }

    state
        .tasks
        .update_status(&task.id, TaskState::Canceled, None)
        .await?;
    Ok(json!({"canceled": true}))
}

async fn handle_session_create(state: Arc<HubState>, _params: Value) -> Result<Value> {
    let session = state.sessions.create().await?;
    state.contexts.create(&session.context_id).await;
    Ok(serde_json::to_value(session)?)
}

async fn handle_sessions_list(state: Arc<HubState>, _params: Value) -> Result<Value> {
    Ok(serde_json::to_value(state.sessions.list().await)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdParams {
    session_id: String,
}

async fn handle_session_get(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: SessionIdParams = parse_params(params)?;
    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| HubError::InvalidParams(format!("unknown session: {}", request.session_id)))?;
    Ok(serde_json::to_value(session)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionAppendParams {
    session_id: String,
    role: SessionRole,
    #[serde(default)]
    agent: String,
    text: String,
}

async fn handle_session_append(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: SessionAppendParams = parse_params(params)?;
    let entry = SessionEntry {
        role: request.role,
        agent: request.agent,
        text: request.text,
        timestamp: chrono::Utc::now(),
    };
    let session = state
        .sessions
        .append_entry(&request.session_id, entry)
        .await
        .map_err(|_| HubError::InvalidParams(format!("unknown session: {}", request.session_id)))?;
    Ok(serde_json::to_value(session)?)
}

async fn handle_session_delete(state: Arc<HubState>, params: Value) -> Result<Value> {
    let request: SessionIdParams = parse_params(params)?;
    state
        .sessions
        .delete(&request.session_id)
        .await
        .map_err(|_| HubError::InvalidParams(format!("unknown session: {}", request.session_id)))?;
    Ok(json!({"deleted": true}))
}

async fn handle_settings_get(state: Arc<HubState>, _params: Value) -> Result<Value> {
    Ok(serde_json::to_value(state.settings.snapshot().await)?)
}

async fn handle_settings_update(state: Arc<HubState>, params: Value) -> Result<Value> {
    let update: SettingsUpdate = parse_params(params)?;
    let snapshot = state.settings.update(update).await?;
    state.apply_settings_to_agents().await;
    Ok(serde_json::to_value(snapshot)?)
}
