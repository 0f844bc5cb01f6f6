//! Agent runtime for the hub: the generic CLI-backed agent, the four
//! backend specializations, the two orchestrators, and the remote peer.

pub mod cli_agent;
pub mod exec;
pub mod llm_orchestrator;
pub mod orchestrator;
pub mod patterns;
pub mod remote;

mod claude;
mod codex;
mod gemini;
mod vibe;

pub use claude::ClaudeAgent;
pub use cli_agent::{CliAgent, CliAgentConfig, PROMPT_PLACEHOLDER};
pub use codex::CodexAgent;
pub use gemini::GeminiAgent;
pub use llm_orchestrator::LlmOrchestratorAgent;
pub use orchestrator::{OrchestratorAgent, DEFAULT_ORCHESTRATION_TIMEOUT};
pub use remote::RemoteAgent;
pub use vibe::VibeAgent;
