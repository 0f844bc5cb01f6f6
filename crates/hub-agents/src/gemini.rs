//! Gemini CLI specialization.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RuntimeCapabilities, StreamEvent,
};
use hub_core::backends::GeminiConfig;
use hub_core::error::Result;
use hub_core::model::{AgentCard, AgentHealth};

use crate::cli_agent::{CliAgent, CliAgentConfig};
use crate::exec::resolve_exec;
use crate::patterns::default_prompt_patterns;

pub struct GeminiAgent {
    inner: CliAgent,
    defaults: RwLock<GeminiConfig>,
}

impl GeminiAgent {
    pub fn new(base_url: &str) -> GeminiAgent {
        let card = AgentCard::new(
            "Gemini CLI",
            "Gemini CLI wrapper",
            format!("{base_url}/agents/gemini"),
            "Google",
        );
        let config = CliAgentConfig {
            agent_id: "gemini".to_string(),
            name: "Gemini CLI".to_string(),
            exec: resolve_exec("gemini", &["GEMINI_CMD", "GEMINI_EXEC"]),
            args: vec!["{prompt}".to_string(), "-o".to_string(), "text".to_string()],
            health_args: vec!["--version".to_string()],
            card,
            prompt_patterns: default_prompt_patterns(),
        };
        GeminiAgent {
            inner: CliAgent::new(config),
            defaults: RwLock::new(GeminiConfig::default()),
        }
    }

    fn snapshot(&self) -> GeminiConfig {
        match self.defaults.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn effective_config(&self, ctx: &ExecutionContext) -> Result<GeminiConfig> {
        let mut config = self.snapshot();
        if let Some(meta) = &ctx.user_message.metadata {
            if let Some(value) = meta.get("gemini") {
                config.apply_override(value)?;
            }
        }
        Ok(config)
    }

    pub fn build_template(config: &GeminiConfig) -> Vec<String> {
        let mut args = vec!["{prompt}".to_string(), "-o".to_string(), "text".to_string()];
        if !config.model.is_empty() {
            args.push("--model".to_string());
            args.push(config.model.clone());
        }
        if config.sandbox {
            args.push("--sandbox".to_string());
        }
        let approval = config.approval_mode.as_str();
        if !approval.is_empty() {
            args.push("--approval-mode".to_string());
            args.push(approval.to_string());
        }
        if !config.resume.is_empty() {
            args.push("--resume".to_string());
            args.push(config.resume.clone());
        }
        args
    }
}

#[async_trait]
impl Agent for GeminiAgent {
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
        if let AgentDefaults::Gemini(config) = defaults {
            match self.defaults.write() {
                Ok(mut guard) => *guard = config,
                Err(poisoned) => *poisoned.into_inner() = config,
            }
        }
    }
}
