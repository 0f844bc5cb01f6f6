//! Claude Code CLI specialization.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RuntimeCapabilities, StreamEvent,
};
use hub_core::backends::ClaudeConfig;
use hub_core::error::Result;
use hub_core::model::{AgentCard, AgentHealth};

use crate::cli_agent::{CliAgent, CliAgentConfig};
use crate::exec::resolve_exec_with_fallback;
use crate::patterns::default_prompt_patterns;

pub struct ClaudeAgent {
    inner: CliAgent,
    defaults: RwLock<ClaudeConfig>,
}

impl ClaudeAgent {
    pub fn new(base_url: &str) -> ClaudeAgent {
        let card = AgentCard::new(
            "Claude Code CLI",
            "Claude Code CLI wrapper",
            format!("{base_url}/agents/claude-code"),
            "Anthropic",
        );
        let config = CliAgentConfig {
            agent_id: "claude-code".to_string(),
            name: "Claude Code CLI".to_string(),
            exec: resolve_exec_with_fallback(
                "claude",
                &["/usr/local/bin/claude"],
                &["CLAUDE_CMD", "CLAUDE_EXEC"],
            ),
            args: vec![
                "-p".to_string(),
                "{prompt}".to_string(),
                "--output-format".to_string(),
                "text".to_string(),
            ],
            health_args: vec!["--version".to_string()],
            card,
            prompt_patterns: default_prompt_patterns(),
        };
        ClaudeAgent {
            inner: CliAgent::new(config),
            defaults: RwLock::new(ClaudeConfig::default()),
        }
    }

    fn snapshot(&self) -> ClaudeConfig {
        match self.defaults.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Settings snapshot merged with the per-call metadata override.
    fn effective_config(&self, ctx: &ExecutionContext) -> Result<ClaudeConfig> {
        let mut config = self.snapshot();
        if let Some(meta) = &ctx.user_message.metadata {
            if let Some(value) = meta.get("claude") {
                config.apply_override(value)?;
            }
        }
        Ok(config)
    }

    /// The argument vector is rebuilt per call from the effective config.
    pub fn build_template(config: &ClaudeConfig) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "{prompt}".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
        ];
        if config.r#continue {
            args.push("--continue".to_string());
        }
        if !config.session_id.is_empty() {
            args.push("--resume".to_string());
            args.push(config.session_id.clone());
        }
        let model = config.model.as_str();
        if !model.is_empty() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        let tools = config.effective_tools();
        if !tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(tools.join(","));
        }
        args
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn card(&self) -> AgentCard {
        self.inner.card()
    }

    fn capabilities(&self) -> RuntimeCapabilities {
        self.inner.capabilities()
    }

    async fn check_health(&self) -> Result<AgentHealth> {
        self.inner.check_health().await
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult> {
        let config = self.effective_config(&ctx)?;
        let template = Self::build_template(&config);
        let prompt = ctx.user_message.text();
        self.inner.run_with_args(&ctx, &template, &prompt).await
    }

    async fn execute_streaming(
        &self,
        ctx: ExecutionContext,
        output: mpsc::Sender<StreamEvent>,
        input: mpsc::Receiver<String>,
    ) -> Result<()> {
        let config = self.effective_config(&ctx)?;
        let template = Self::build_template(&config);
        let prompt = ctx.user_message.text();
        self.inner
            .stream_with_args(&ctx, &template, &prompt, output, input)
            .await
    }

    fn set_default_config(&self, defaults: AgentDefaults) {
        if let AgentDefaults::Claude(config) = defaults {
            match self.defaults.write() {
                Ok(mut guard) => *guard = config,
                Err(poisoned) => *poisoned.into_inner() = config,
            }
        }
    }
}
