//! Vibe CLI specialization.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RuntimeCapabilities, StreamEvent,
};
use hub_core::backends::VibeConfig;
use hub_core::error::Result;
use hub_core::model::{AgentCard, AgentHealth};

use crate::cli_agent::{CliAgent, CliAgentConfig};
use crate::codex::assemble_prompt;
use crate::exec::resolve_exec;
use crate::patterns::default_prompt_patterns;

pub struct VibeAgent {
    inner: CliAgent,
    defaults: RwLock<VibeConfig>,
}

impl VibeAgent {
    pub fn new(base_url: &str) -> VibeAgent {
        let card = AgentCard::new(
            "Vibe CLI",
            "Vibe CLI wrapper",
            format!("{base_url}/agents/vibe"),
            "Mistral",
        );
        let config = CliAgentConfig {
            agent_id: "vibe".to_string(),
            name: "Vibe CLI".to_string(),
            exec: resolve_exec("vibe", &["VIBE_CMD", "VIBE_EXEC"]),
            args: vec![
                "-p".to_string(),
                "{prompt}".to_string(),
                "--output".to_string(),
                "text".to_string(),
            ],
            health_args: vec!["--help".to_string()],
            card,
            prompt_patterns: default_prompt_patterns(),
        };
        VibeAgent {
            inner: CliAgent::new(config),
            defaults: RwLock::new(VibeConfig::default()),
        }
    }

    fn snapshot(&self) -> VibeConfig {
        match self.defaults.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn effective_config(&self, ctx: &ExecutionContext) -> Result<VibeConfig> {
        let mut config = self.snapshot();
        if let Some(meta) = &ctx.user_message.metadata {
            if let Some(value) = meta.get("vibe") {
                config.apply_override(value)?;
            }
        }
        Ok(config)
    }

    /// Non-interactive mode switches to the `--prompt` flag, which also
    /// auto-approves tool use.
    pub fn build_template(config: &VibeConfig) -> Vec<String> {
        let mut args = if config.non_interactive {
            vec![
                "--prompt".to_string(),
                "{prompt}".to_string(),
                "--output".to_string(),
                "text".to_string(),
            ]
        } else {
            vec![
                "-p".to_string(),
                "{prompt}".to_string(),
                "--output".to_string(),
                "text".to_string(),
            ]
        };
        if !config.agent.is_empty() {
            args.push("--agent".to_string());
            args.push(config.agent.clone());
        }
        args
    }

    pub fn build_prompt(config: &VibeConfig, ctx: &ExecutionContext) -> String {
        assemble_prompt(
            &config.system_prompt,
            config.include_history,
            &ctx.previous_history,
            &ctx.user_message.text(),
        )
    }
}

#[async_trait]
impl Agent for VibeAgent {
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
        let prompt = Self::build_prompt(&config, &ctx);
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
        let prompt = Self::build_prompt(&config, &ctx);
        self.inner
            .stream_with_args(&ctx, &template, &prompt, output, input)
            .await
    }

    fn set_default_config(&self, defaults: AgentDefaults) {
        if let AgentDefaults::Vibe(config) = defaults {
            match self.defaults.write() {
                Ok(mut guard) => *guard = config,
                Err(poisoned) => *poisoned.into_inner() = config,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactive_template_uses_short_flag() {
        let args = VibeAgent::build_template(&VibeConfig::default());
        assert_eq!(args, vec!["-p", "{prompt}", "--output", "text"]);
    }

    #[test]
    fn non_interactive_switches_to_prompt_flag() {
        let config = VibeConfig {
            non_interactive: true,
            agent: "reviewer".to_string(),
            ..VibeConfig::default()
        };
        let args = VibeAgent::build_template(&config);
        assert_eq!(args[0], "--prompt");
        let agent_at = args.iter().position(|a| a == "--agent").unwrap();
        assert_eq!(args[agent_at + 1], "reviewer");
    }
}
