//! Scripted model clients for tests and demos
//!
//! These run the full orchestration stack without a real provider: a
//! [`ScriptedModel`] replays a fixed sequence of responses, a [`FnModel`]
//! computes each response from the request with a closure.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::protocol::MeshResult;

use super::{CompletionRequest, LlmClient, ModelResponse};

/// Model client that replays a fixed script of responses
///
/// Responses are served in order; once the script is exhausted every further
/// call returns the fallback (a plain "Done." unless overridden).
pub struct ScriptedModel {
    responses: Mutex<VecDeque<MeshResult<ModelResponse>>>,
    fallback: ModelResponse,
}

impl ScriptedModel {
    /// Create a scripted model from a response sequence
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: ModelResponse::text("Done."),
        }
    }

    /// Create a scripted model whose entries may include errors
    pub fn from_results(responses: Vec<MeshResult<ModelResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fallback: ModelResponse::text("Done."),
        }
    }

    /// Replace the response served after the script runs out
    pub fn with_fallback(mut self, fallback: ModelResponse) -> Self {
        self.fallback = fallback;
        self
    }

    /// Number of scripted responses not yet served
    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("script lock poisoned").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn complete(&self, _request: CompletionRequest) -> MeshResult<ModelResponse> {
        let next = self
            .responses
            .lock()
            .expect("script lock poisoned")
            .pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Model client backed by a closure over the completion request
#[derive(Clone)]
pub struct FnModel {
    handler: Arc<dyn Fn(&CompletionRequest) -> MeshResult<ModelResponse> + Send + Sync>,
}

impl FnModel {
    /// Create a model from a request handler
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MeshResult<ModelResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl LlmClient for FnModel {
    async fn complete(&self, request: CompletionRequest) -> MeshResult<ModelResponse> {
        (self.handler)(&request)
    }
}

impl std::fmt::Debug for FnModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModel").finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::llm::ToolCall;

    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are a test agent".to_string(),
            history: vec![],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new("echo", json!({}))]),
            ModelResponse::text("final"),
        ]);

        let first = model.complete(request()).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);

        let second = model.complete(request()).await.unwrap();
        assert_eq!(second.text.as_deref(), Some("final"));

        // script exhausted, fallback from here on
        let third = model.complete(request()).await.unwrap();
        assert_eq!(third.text.as_deref(), Some("Done."));
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_fn_model_observes_history() {
        let model = FnModel::new(|req| {
            Ok(ModelResponse::text(format!("saw {} messages", req.history.len())))
        });

        let response = model.complete(request()).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("saw 0 messages"));
    }
}
