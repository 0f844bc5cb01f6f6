//! Error taxonomy for the hub.
//!
//! Every kind maps onto a JSON-RPC error code; transports never surface
//! anything richer than `{code, message}` to callers.

use thiserror::Error;

use crate::jsonrpc::{codes, RpcError};
use crate::model::TaskState;

/// Hub-wide error type.
#[derive(Debug, Error)]
pub enum HubError {
    /// Input text is blank after trimming.
    #[error("empty prompt")]
    EmptyPrompt,

    /// Orchestrator invoked with no configured delegates.
    #[error("no delegate agents configured")]
    NoDelegates,

    /// Deadline elapsed before completion.
    #[error("deadline exceeded")]
    Timeout,

    /// Child process or downstream execution failed.
    #[error("{0}")]
    Execution(String),

    /// Referenced agent id is not registered.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Agent registered but its last probe was unhealthy.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Referenced task id has no record.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Task is in a terminal state.
    #[error("task not cancelable: {0}")]
    TaskNotCancelable(String),

    /// Requested state change violates the task state machine.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    /// Reserved: contexts are auto-created on first use.
    #[error("context not found: {0}")]
    ContextNotFound(String),

    /// Missing required field or unknown closed-set value.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Capability not offered by the target agent.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Malformed on-disk state file.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// File system I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unhandled failure during handler execution.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// JSON-RPC error code for this kind.
    pub fn rpc_code(&self) -> i64 {
        match self {
            HubError::EmptyPrompt | HubError::InvalidParams(_) => codes::INVALID_PARAMS,
            HubError::TaskNotFound(_) => codes::TASK_NOT_FOUND,
            HubError::TaskNotCancelable(_) | HubError::InvalidTransition { .. } => {
                codes::TASK_NOT_CANCELABLE
            }
            HubError::AgentNotFound(_) => codes::AGENT_NOT_FOUND,
            HubError::AgentUnavailable(_) => codes::AGENT_UNAVAILABLE,
            HubError::Unsupported(_) => codes::UNSUPPORTED,
            HubError::Timeout => codes::TIMEOUT,
            HubError::ContextNotFound(_) => codes::CONTEXT_NOT_FOUND,
            HubError::NoDelegates
            | HubError::Execution(_)
            | HubError::Persistence(_)
            | HubError::Io(_)
            | HubError::Serialization(_)
            | HubError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<HubError> for RpcError {
    fn from(err: HubError) -> RpcError {
        RpcError {
            code: err.rpc_code(),
            message: err.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_its_own_code() {
        assert_eq!(HubError::Timeout.rpc_code(), codes::TIMEOUT);
    }

    #[test]
    fn empty_prompt_is_invalid_params() {
        assert_eq!(HubError::EmptyPrompt.rpc_code(), codes::INVALID_PARAMS);
    }

    #[test]
    fn rpc_error_carries_message() {
        let rpc: RpcError = HubError::AgentNotFound("ghost".to_string()).into();
        assert_eq!(rpc.code, codes::AGENT_NOT_FOUND);
        assert_eq!(rpc.message, "agent not found: ghost");
    }
}
