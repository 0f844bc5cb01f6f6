//! LLM-routed orchestrator: ask a router agent for a JSON routing plan,
//! validate it against the configured delegates, and dispatch.
//!
//! Routing failure is recoverable: the orchestrator falls back to the
//! first delegate and prepends a one-line note to the aggregated reply.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RpcCaller, RuntimeCapabilities,
};
use hub_core::error::{HubError, Result};
use hub_core::model::{AgentCard, AgentHealth};

use crate::orchestrator::{
    aggregated_result, send_to_agent, DEFAULT_ORCHESTRATION_TIMEOUT,
};

/// Hard cap on routed targets per request.
pub const MAX_ROUTING_TARGETS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTarget {
    pub agent_id: String,
    pub message: String,
}

/// The shapes a router reply may take: the canonical plan, a bare target
/// array, or a single target object. Alternate key spellings are folded
/// in during normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTarget {
    #[serde(rename = "agentId")]
    agent_id: String,
    agent: String,
    message: String,
    task: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    targets: Vec<RawTarget>,
    routes: Vec<RawTarget>,
    tasks: Vec<RawTarget>,
    #[serde(rename = "agentId")]
    agent_id: String,
    agent: String,
    message: String,
    task: String,
    notes: String,
}

pub struct LlmOrchestratorAgent {
    caller: Arc<dyn RpcCaller>,
    delegates: RwLock<Vec<String>>,
    router_agent: String,
    card: AgentCard,
}

impl LlmOrchestratorAgent {
    pub fn new(
        caller: Arc<dyn RpcCaller>,
        base_url: &str,
        delegates: Vec<String>,
        router_agent: &str,
    ) -> Self {
        let card = AgentCard::new(
            "A2A Orchestrator (LLM)",
            "LLM-driven orchestrator that routes tasks to local agents",
            format!("{base_url}/agents/orchestrator"),
            "Local",
        );
        LlmOrchestratorAgent {
            caller,
            delegates: RwLock::new(delegates),
            router_agent: router_agent.trim().to_string(),
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

    /// Delegate descriptors for the routing prompt, enriched with card
    /// descriptions when the hub can supply them.
    async fn describe_delegates(&self, delegates: &[String]) -> Vec<(String, String, String)> {
        #[derive(Deserialize)]
        struct Entry {
            id: String,
            name: String,
            card: AgentCard,
        }
        let fallback = |ids: &[String]| {
            ids.iter()
                .map(|id| (id.clone(), id.clone(), String::new()))
                .collect::<Vec<_>>()
        };
        let response = match self
            .caller
            .call("hub/agents/list", json!({"includeHealth": false}))
            .await
        {
            Ok(response) => response,
            Err(_) => return fallback(delegates),
        };
        let Some(result) = response.result else {
            return fallback(delegates);
        };
        let Ok(entries) = serde_json::from_value::<Vec<Entry>>(result) else {
            return fallback(delegates);
        };
        delegates
            .iter()
            .map(|id| {
                entries
                    .iter()
                    .find(|entry| &entry.id == id)
                    .map(|entry| {
                        let description = if entry.card.description.trim().is_empty() {
                            entry.name.trim().to_string()
                        } else {
                            entry.card.description.trim().to_string()
                        };
                        (entry.id.clone(), entry.name.clone(), description)
                    })
                    .unwrap_or_else(|| (id.clone(), id.clone(), String::new()))
            })
            .collect()
    }

    async fn route(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
        descriptors: &[(String, String, String)],
        timeout: Option<Duration>,
    ) -> Result<(Vec<RoutingTarget>, String)> {
        let routing_prompt = build_routing_prompt(prompt, descriptors);
        let task = send_to_agent(
            self.caller.as_ref(),
            ctx,
            &self.router_agent,
            &routing_prompt,
            timeout,
        )
        .await?;
        parse_routing_targets(&task.result_text())
    }
}

/// Fixed instruction block, schema, and delegate list for the router.
pub fn build_routing_prompt(prompt: &str, agents: &[(String, String, String)]) -> String {
    let mut text = String::new();
    text.push_str("You are a routing agent for a local A2A hub.\n");
    text.push_str("Choose the best agent(s) to handle the user request.\n");
    text.push_str("Return JSON only with this schema:\n");
    text.push_str("{\"targets\":[{\"agentId\":\"<id>\",\"message\":\"<message>\"}],\"notes\":\"optional\"}\n");
    text.push_str("Rules:\n");
    text.push_str("- Use only agentId values from the list below.\n");
    text.push_str("- Use at most 3 targets.\n");
    text.push_str("- If a single agent can handle the request, return one target.\n");
    text.push_str("- Keep messages concise and grounded in the user request.\n\n");
    text.push_str("Available agents:\n");
    for (id, name, description) in agents {
        if description.is_empty() {
            text.push_str(&format!("- {id}: {name}\n"));
        } else {
            text.push_str(&format!("- {id}: {name} - {description}\n"));
        }
    }
    text.push_str("\nUser request:\n");
    text.push_str(prompt);
    text
}

/// First JSON value embedded in `text`, tolerating prose and code fences
/// around it.
fn extract_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
    match stream.next() {
        Some(Ok(value)) => Some(value.to_string()),
        _ => None,
    }
}

fn fold_target(raw: RawTarget) -> Option<RoutingTarget> {
    let agent_id = if raw.agent_id.trim().is_empty() {
        raw.agent.trim().to_string()
    } else {
        raw.agent_id.trim().to_string()
    };
    if agent_id.is_empty() {
        return None;
    }
    let message = if raw.message.trim().is_empty() {
        raw.task.trim().to_string()
    } else {
        raw.message.trim().to_string()
    };
    Some(RoutingTarget { agent_id, message })
}

/// Parse the router reply into targets plus optional notes.
pub fn parse_routing_targets(text: &str) -> Result<(Vec<RoutingTarget>, String)> {
    let payload =
        extract_json(text).ok_or_else(|| HubError::Execution("router returned no JSON".to_string()))?;

    if let Ok(plan) = serde_json::from_str::<RawPlan>(&payload) {
        let raw_targets = if !plan.targets.is_empty() {
            plan.targets
        } else if !plan.routes.is_empty() {
            plan.routes
        } else if !plan.tasks.is_empty() {
            plan.tasks
        } else if !plan.agent_id.is_empty() || !plan.agent.is_empty() {
            vec![RawTarget {
                agent_id: plan.agent_id,
                agent: plan.agent,
                message: plan.message,
                task: plan.task,
            }]
        } else {
            Vec::new()
        };
        let targets: Vec<RoutingTarget> = raw_targets.into_iter().filter_map(fold_target).collect();
        if !targets.is_empty() {
            return Ok((targets, plan.notes));
        }
    }
    if let Ok(raw_targets) = serde_json::from_str::<Vec<RawTarget>>(&payload) {
        let targets: Vec<RoutingTarget> = raw_targets.into_iter().filter_map(fold_target).collect();
        if !targets.is_empty() {
            return Ok((targets, String::new()));
        }
    }
    if let Ok(raw) = serde_json::from_str::<RawTarget>(&payload) {
        if let Some(target) = fold_target(raw) {
            return Ok((vec![target], String::new()));
        }
    }
    Err(HubError::Execution("unable to parse routing plan".to_string()))
}

/// Drop unknown agent ids, default missing messages to the original
/// prompt, and cap the target count.
pub fn normalize_targets(
    targets: Vec<RoutingTarget>,
    delegates: &[String],
    fallback_message: &str,
) -> Vec<RoutingTarget> {
    let mut normalized: Vec<RoutingTarget> = targets
        .into_iter()
        .filter(|target| delegates.iter().any(|id| id == &target.agent_id))
        .map(|mut target| {
            if target.message.is_empty() {
                target.message = fallback_message.to_string();
            }
            target
        })
        .collect();
    normalized.truncate(MAX_ROUTING_TARGETS);
    normalized
}

#[async_trait]
impl Agent for LlmOrchestratorAgent {
    fn id(&self) -> &str {
        "orchestrator"
    }

    fn name(&self) -> &str {
        "A2A Orchestrator (LLM)"
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
        if self.router_agent.is_empty() {
            return Err(HubError::Execution("no router agent configured".to_string()));
        }
        if self.router_agent == self.id() {
            return Err(HubError::Execution(
                "router agent cannot be orchestrator".to_string(),
            ));
        }

        let timeout = ctx.timeout.unwrap_or(DEFAULT_ORCHESTRATION_TIMEOUT);
        let deadline = Instant::now() + timeout;
        let descriptors = self.describe_delegates(&delegates).await;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut routing_note = String::new();
        let (targets, notes) = match self
            .route(&ctx, &prompt, &descriptors, Some(remaining))
            .await
        {
            Ok((targets, notes)) => (targets, notes),
            Err(err) => {
                warn!(error = %err, "routing failed, falling back to first delegate");
                routing_note = format!("note: routing fallback used ({err})");
                (Vec::new(), String::new())
            }
        };

        let mut targets = normalize_targets(targets, &delegates, &prompt);
        if targets.is_empty() {
            if routing_note.is_empty() {
                routing_note = "note: routing fallback used (no valid targets)".to_string();
            }
            targets = vec![RoutingTarget {
                agent_id: delegates[0].clone(),
                message: prompt.clone(),
            }];
        }
        debug!(targets = targets.len(), "dispatching routed targets");

        let mut blocks = Vec::with_capacity(targets.len() + 2);
        if !routing_note.is_empty() {
            blocks.push(routing_note);
        }
        if !notes.trim().is_empty() {
            blocks.push(format!("note: {}", notes.trim()));
        }

        for target in &targets {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                blocks.push(format!("{}: error: deadline exceeded", target.agent_id));
                continue;
            }
            match send_to_agent(
                self.caller.as_ref(),
                &ctx,
                &target.agent_id,
                &target.message,
                Some(remaining),
            )
            .await
            {
                Ok(task) => blocks.push(format!("{}: {}", target.agent_id, task.result_text())),
                Err(err) => blocks.push(format!("{}: error: {err}", target.agent_id)),
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
    use hub_core::jsonrpc::Response;
    use hub_core::model::{Message, Task, TaskState};
    use serde_json::Value;
    use tokio::sync::Mutex;

    #[test]
    fn parses_canonical_plan() {
        let (targets, notes) = parse_routing_targets(
            r#"{"targets":[{"agentId":"claude-code","message":"do X"}],"notes":"one target"}"#,
        )
        .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].agent_id, "claude-code");
        assert_eq!(targets[0].message, "do X");
        assert_eq!(notes, "one target");
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "```json\n{\"targets\":[{\"agentId\":\"claude-code\",\"message\":\"do X\"},{\"agentId\":\"unknown\",\"message\":\"...\"}]}\n```";
        let (targets, _) = parse_routing_targets(reply).unwrap();
        assert_eq!(targets.len(), 2);
        let kept = normalize_targets(targets, &["claude-code".to_string()], "orig");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].agent_id, "claude-code");
    }

    #[test]
    fn parses_bare_array() {
        let (targets, _) =
            parse_routing_targets(r#"[{"agent":"gemini","task":"summarize"}]"#).unwrap();
        assert_eq!(targets[0].agent_id, "gemini");
        assert_eq!(targets[0].message, "summarize");
    }

    #[test]
    fn parses_single_target_object() {
        let (targets, _) = parse_routing_targets(r#"{"agentId":"vibe"}"#).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].agent_id, "vibe");
        assert!(targets[0].message.is_empty());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_routing_targets("not json").is_err());
    }

    #[test]
    fn rejects_json_without_targets() {
        assert!(parse_routing_targets(r#"{"notes":"nothing here"}"#).is_err());
    }

    #[test]
    fn normalize_caps_at_three_targets() {
        let delegates = vec!["a".to_string(), "b".to_string()];
        let targets: Vec<RoutingTarget> = ["a", "b", "a", "b", "a"]
            .iter()
            .map(|id| RoutingTarget {
                agent_id: id.to_string(),
                message: "m".to_string(),
            })
            .collect();
        let kept = normalize_targets(targets, &delegates, "orig");
        assert_eq!(kept.len(), MAX_ROUTING_TARGETS);
    }

    #[test]
    fn normalize_defaults_message_to_prompt() {
        let kept = normalize_targets(
            vec![RoutingTarget {
                agent_id: "a".to_string(),
                message: String::new(),
            }],
            &["a".to_string()],
            "original prompt",
        );
        assert_eq!(kept[0].message, "original prompt");
    }

    #[test]
    fn routing_prompt_lists_delegates() {
        let prompt = build_routing_prompt(
            "write a test",
            &[(
                "claude-code".to_string(),
                "Claude Code CLI".to_string(),
                "Claude Code CLI wrapper".to_string(),
            )],
        );
        assert!(prompt.contains("- claude-code: Claude Code CLI - Claude Code CLI wrapper"));
        assert!(prompt.ends_with("write a test"));
        assert!(prompt.contains("\"targets\""));
    }

    /// Caller whose router replies with plain text, forcing the fallback.
    struct NonJsonRouterCaller {
        sends: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RpcCaller for NonJsonRouterCaller {
        async fn call(&self, method: &str, params: Value) -> Result<Response> {
            if method == "hub/agents/list" {
                return Ok(Response::result(serde_json::json!([]), None));
            }
            let target = params["message"]["metadata"]["targetAgent"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            self.sends.lock().await.push(target.clone());
            let mut task = Task::new("sub", "ctx");
            task.status.state = TaskState::Completed;
            let reply = if target == "vibe" {
                "not json".to_string()
            } else {
                format!("{target} did the work")
            };
            task.status.message = Some(Message::agent_text("sub", "ctx", reply));
            Ok(Response::result(serde_json::to_value(task)?, None))
        }
    }

    #[tokio::test]
    async fn falls_back_to_first_delegate_with_a_note() {
        let caller = Arc::new(NonJsonRouterCaller {
            sends: Mutex::new(Vec::new()),
        });
        let agent = LlmOrchestratorAgent::new(
            caller.clone(),
            "http://127.0.0.1:8080",
            vec!["claude-code".to_string(), "gemini".to_string()],
            "vibe",
        );
        let ctx = ExecutionContext::new("t", "c", Message::user_text("write a test"));
        let result = agent.execute(ctx).await.unwrap();
        let text = result.task.result_text();
        assert!(text.starts_with("note: routing fallback used"), "{text}");
        assert!(text.contains("claude-code: "), "{text}");

        let sends = caller.sends.lock().await;
        assert_eq!(sends.as_slice(), ["vibe", "claude-code"]);
    }

    #[tokio::test]
    async fn router_cannot_be_the_orchestrator_itself() {
        let caller = Arc::new(NonJsonRouterCaller {
            sends: Mutex::new(Vec::new()),
        });
        let agent = LlmOrchestratorAgent::new(
            caller,
            "http://b",
            vec!["claude-code".to_string()],
            "orchestrator",
        );
        let ctx = ExecutionContext::new("t", "c", Message::user_text("x"));
        assert!(agent.execute(ctx).await.is_err());
    }
}
