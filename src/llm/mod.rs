//! Language model interface
//!
//! The model is an external collaborator: given a system prompt, the
//! accumulated history and the available tool descriptors, it answers with
//! final text, tool calls, or both. Everything behind this trait (provider,
//! wire format, retries) is out of scope for the orchestration core.

pub mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    protocol::{message::Message, MeshResult},
    tool::ModelToolDescriptor,
};

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt framing the agent's role
    pub system_prompt: String,

    /// Full accumulated conversation history
    pub history: Vec<Message>,

    /// Tools the model may call this turn
    pub tools: Vec<ModelToolDescriptor>,
}

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Correlation id echoed back in the matching tool result
    pub id: String,

    /// Name of the requested tool
    pub name: String,

    /// Call input as structured data
    pub input: Value,
}

impl ToolCall {
    /// Create a tool call with a fresh correlation id
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            input,
        }
    }
}

/// Model output for one turn: final text, tool calls, or both
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Plain text answer, if any
    pub text: Option<String>,

    /// Tool calls to execute before the next turn, in request order
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// A text-only response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A tool-calling response
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }

    /// Attach accompanying text to a tool-calling response
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// True when the response carries neither text nor tool calls
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
            && self
                .text
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
    }
}

/// Client for the external language model
///
/// Implementations wrap a concrete provider. A transport failure here is
/// fatal to the calling reasoning loop; everything else the loop absorbs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion
    async fn complete(&self, request: CompletionRequest) -> MeshResult<ModelResponse>;
}
