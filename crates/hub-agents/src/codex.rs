//! Codex CLI specialization.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hub_core::agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RuntimeCapabilities, StreamEvent,
};
use hub_core::backends::CodexConfig;
use hub_core::error::Result;
use hub_core::model::{AgentCard, AgentHealth, Message, Role};

use crate::cli_agent::{CliAgent, CliAgentConfig};
use crate::exec::resolve_exec;
use crate::patterns::default_prompt_patterns;

pub struct CodexAgent {
    inner: CliAgent,
    defaults: RwLock<CodexConfig>,
}

impl CodexAgent {
    pub fn new(base_url: &str) -> CodexAgent {
        let card = AgentCard::new(
            "Codex CLI",
            "OpenAI Codex CLI wrapper",
            format!("{base_url}/agents/codex"),
            "OpenAI",
        );
        let config = CliAgentConfig {
            agent_id: "codex".to_string(),
            name: "Codex CLI".to_string(),
            exec: resolve_exec("codex", &["CODEX_CMD", "CODEX_EXEC"]),
            args: vec!["exec".to_string(), "{prompt}".to_string()],
            health_args: vec!["--version".to_string()],
            card,
            prompt_patterns: default_prompt_patterns(),
        };
        CodexAgent {
            inner: CliAgent::new(config),
            defaults: RwLock::new(CodexConfig::default()),
        }
    }

    fn snapshot(&self) -> CodexConfig {
        match self.defaults.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn effective_config(&self, ctx: &ExecutionContext) -> Result<CodexConfig> {
        let mut config = self.snapshot();
        if let Some(meta) = &ctx.user_message.metadata {
            if let Some(value) = meta.get("codex") {
                config.apply_override(value)?;
            }
        }
        Ok(config)
    }

    /// `codex exec [OPTIONS] <prompt>`. `bypass_approvals` preempts
    /// `full_auto`, which preempts the sandbox/approval pair.
    pub fn build_template(config: &CodexConfig) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if !config.model.is_empty() {
            args.push("-m".to_string());
            args.push(config.model.clone());
        }
        if !config.profile.is_empty() {
            args.push("--profile".to_string());
            args.push(config.profile.clone());
        }
        if config.bypass_approvals {
            args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        } else if config.full_auto {
            args.push("--full-auto".to_string());
        } else {
            let sandbox = config.sandbox_mode.as_str();
            if !sandbox.is_empty() {
                args.push("--sandbox".to_string());
                args.push(sandbox.to_string());
            }
            let approval = config.approval_policy.as_str();
            if !approval.is_empty() {
                args.push("--ask-for-approval".to_string());
                args.push(approval.to_string());
            }
        }
        if config.search {
            args.push("--search".to_string());
        }
        args.push("{prompt}".to_string());
        args
    }

    /// System prompt and compacted history are folded into the prompt
    /// itself; the codex CLI has no flags for either.
    pub fn build_prompt(config: &CodexConfig, ctx: &ExecutionContext) -> String {
        assemble_prompt(
            &config.system_prompt,
            config.include_history,
            &ctx.previous_history,
            &ctx.user_message.text(),
        )
    }
}

/// Shared prompt assembly for backends that fold context into the prompt.
pub(crate) fn assemble_prompt(
    system_prompt: &str,
    include_history: bool,
    history: &[Message],
    user_text: &str,
) -> String {
    let mut sections = Vec::new();
    if !system_prompt.trim().is_empty() {
        sections.push(system_prompt.trim().to_string());
    }
    if include_history && !history.is_empty() {
        let lines: Vec<String> = history
            .iter()
            .filter(|message| !message.text().is_empty())
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Agent => "agent",
                };
                format!("{role}: {}", message.text())
            })
            .collect();
        if !lines.is_empty() {
            sections.push(format!("Conversation so far:\n{}", lines.join("\n")));
        }
    }
    sections.push(user_text.to_string());
    sections.join("\n\n")
}

#[async_trait]
impl Agent for CodexAgent {
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
        if let AgentDefaults::Codex(config) = defaults {
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
    use hub_core::backends::{CodexApprovalPolicy, CodexSandboxMode};

    #[test]
    fn default_template_is_exec_prompt() {
        let args = CodexAgent::build_template(&CodexConfig::default());
        assert_eq!(args, vec!["exec", "{prompt}"]);
    }

    #[test]
    fn sandbox_and_approval_flags() {
        let config = CodexConfig {
            sandbox_mode: CodexSandboxMode::WorkspaceWrite,
            approval_policy: CodexApprovalPolicy::OnFailure,
            search: true,
            ..CodexConfig::default()
        };
        let args = CodexAgent::build_template(&config);
        let sandbox_at = args.iter().position(|a| a == "--sandbox").unwrap();
        assert_eq!(args[sandbox_at + 1], "workspace-write");
        let approval_at = args.iter().position(|a| a == "--ask-for-approval").unwrap();
        assert_eq!(args[approval_at + 1], "on-failure");
        assert!(args.contains(&"--search".to_string()));
        assert_eq!(args.last().unwrap(), "{prompt}");
    }

    #[test]
    fn full_auto_preempts_sandbox() {
        let config = CodexConfig {
            full_auto: true,
            sandbox_mode: CodexSandboxMode::ReadOnly,
            ..CodexConfig::default()
        };
        let args = CodexAgent::build_template(&config);
        assert!(args.contains(&"--full-auto".to_string()));
        assert!(!args.contains(&"--sandbox".to_string()));
    }

    #[test]
    fn bypass_preempts_full_auto() {
        let config = CodexConfig {
            bypass_approvals: true,
            full_auto: true,
            ..CodexConfig::default()
        };
        let args = CodexAgent::build_template(&config);
        assert!(args.contains(&"--dangerously-bypass-approvals-and-sandbox".to_string()));
        assert!(!args.contains(&"--full-auto".to_string()));
    }

    #[test]
    fn prompt_builder_prepends_system_and_history() {
        let config = CodexConfig {
            system_prompt: "Be terse.".to_string(),
            include_history: true,
            ..CodexConfig::default()
        };
        let mut ctx = ExecutionContext::new("t", "c", Message::user_text("do the thing"));
        ctx.previous_history = vec![
            Message::user_text("earlier question"),
            Message::agent_text("t0", "c", "earlier answer"),
        ];
        let prompt = CodexAgent::build_prompt(&config, &ctx);
        assert!(prompt.starts_with("Be terse."));
        assert!(prompt.contains("user: earlier question"));
        assert!(prompt.contains("agent: earlier answer"));
        assert!(prompt.ends_with("do the thing"));
    }
}
