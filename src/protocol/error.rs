//! Error types for orchestration operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskStatus;

/// Main error type for orchestration operations
///
/// Tool-level and validation-level errors are absorbed into the reasoning
/// loop as structured tool results; only transport failures and lifecycle
/// invariant violations terminate a task.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Transport-level error (network, model call plumbing, dispatch)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed input to a tool or an inbound task envelope
    #[error("Validation error: {0}")]
    Validation(String),

    /// The model requested a tool name that is not registered
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// A tool ran but failed
    #[error("Tool execution error: {source}")]
    ToolExecution {
        #[from]
        source: ToolError,
    },

    /// Attempted task state change that violates the lifecycle graph
    #[error("Invalid task transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Target agent not registered or unreachable
    #[error("Agent not found or unreachable: {agent_id}")]
    AgentNotFound { agent_id: String },

    /// Conditional write lost against a concurrent update
    #[error("Conflict on record {key}: expected version {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model call or delegated task exceeded its deadline
    #[error("Request timeout")]
    Timeout,
}

/// Structured tool failure with machine-readable code
///
/// This is the form in which failures travel back to the model as tool
/// results; it never escapes the reasoning loop as a raised error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ToolError {
    /// Error code (e.g., "INVALID_INPUT", "RECORD_NOT_FOUND")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error details as structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ToolError {
    /// Create a new tool error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the tool error
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The JSON value fed back to the model as the tool result content
    pub fn to_result_content(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.message,
            "code": self.code,
            "details": self.details,
        })
    }
}

/// Result type alias for orchestration operations
pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    /// Collapse this error into the structured tool-error form
    ///
    /// Used at the registry boundary so the model always receives a tool
    /// result it can react to, whatever went wrong underneath.
    pub fn into_tool_error(self) -> ToolError {
        match self {
            MeshError::ToolExecution { source } => source,
            MeshError::Validation(message) => ToolError::new("INVALID_INPUT", message),
            MeshError::UnknownTool { name } => {
                ToolError::new("UNKNOWN_TOOL", format!("no tool registered under '{name}'"))
            }
            MeshError::Conflict {
                key,
                expected,
                found,
            } => ToolError::new(
                "CONFLICT",
                format!("record {key} changed underneath us (expected v{expected}, found v{found})"),
            ),
            other => ToolError::new("TOOL_FAILED", other.to_string()),
        }
    }
}

impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MeshError::Timeout
        } else if err.is_connect() {
            MeshError::Transport(format!("Connection error: {}", err))
        } else {
            MeshError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_result_content() {
        let err = ToolError::new("RECORD_NOT_FOUND", "order ORD-9 does not exist")
            .with_details(serde_json::json!({"orderId": "ORD-9"}));

        let content = err.to_result_content();
        assert_eq!(content["error"], "order ORD-9 does not exist");
        assert_eq!(content["code"], "RECORD_NOT_FOUND");
        assert_eq!(content["details"]["orderId"], "ORD-9");
    }

    #[test]
    fn test_into_tool_error_mapping() {
        let err = MeshError::UnknownTool {
            name: "frobnicate".to_string(),
        };
        assert_eq!(err.into_tool_error().code, "UNKNOWN_TOOL");

        let err = MeshError::Validation("missing field 'orderId'".to_string());
        assert_eq!(err.into_tool_error().code, "INVALID_INPUT");

        let inner = ToolError::new("INSUFFICIENT_INVENTORY", "0 units left");
        let err = MeshError::from(inner.clone());
        assert_eq!(err.into_tool_error(), inner);
    }
}
