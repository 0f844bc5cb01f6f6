//! Core of the local multi-agent hub: the task/message data model, the
//! agent capability surface, JSON-RPC dispatch, durable stores, and the
//! agent registry.

pub mod agent;
pub mod backends;
pub mod error;
pub mod fsio;
pub mod id;
pub mod jsonrpc;
pub mod model;
pub mod registry;
pub mod store;

pub use agent::{
    Agent, AgentDefaults, ExecutionContext, ExecutionResult, RpcCaller, RuntimeCapabilities,
    StreamEvent, StreamEventKind,
};
pub use error::{HubError, Result};
pub use model::{
    AgentCard, AgentCapabilities, AgentHealth, Artifact, FileContent, HealthStatus, Message, Part,
    Provider, Role, Skill, Task, TaskState, TaskStatus,
};
pub use registry::{AgentRegistry, RegisteredAgent};
