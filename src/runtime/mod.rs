//! Per-specialist agent runtime
//!
//! Hosts one specialist's reasoning loop: given a task request and a fixed
//! tool set, repeatedly call the model, execute requested tool calls, feed
//! results back, and drive the task to a terminal status. The same bounded
//! loop is reused by the supervisor with its own tool set.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::TaskRequest,
    events::EventPublisher,
    llm::{CompletionRequest, LlmClient},
    protocol::{
        agent::AgentCard,
        error::MeshError,
        message::{Message, Role},
        task::{Task, TaskStatus},
        MeshResult,
    },
    tool::{ModelToolDescriptor, TenantContext, ToolRegistry},
};

/// Reserved tool name a loop may expose for requesting missing input
pub const INPUT_REQUEST_TOOL: &str = "request_input";

/// Result surfaced when the model answers with neither text nor tool calls
pub(crate) const UNEXPECTED_RESPONSE_TEXT: &str =
    "The agent received an unexpected model response and stopped.";

/// Result surfaced when the iteration bound runs out with no usable text
pub(crate) const EXHAUSTED_FALLBACK_TEXT: &str =
    "Stopped after reaching the iteration limit without a final answer.";

/// Configuration for one reasoning loop
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on model turns per task
    pub max_iterations: usize,

    /// Deadline for each individual model call
    pub model_timeout: Duration,

    /// Keep `<thinking>` markup in final text instead of stripping it
    pub preserve_thinking_tags: bool,

    /// Execute multiple tool calls from one turn concurrently
    ///
    /// Results are re-assembled in request order either way.
    pub concurrent_tools: bool,

    /// Expose the reserved input-request tool, letting the agent park the
    /// task as `input-required` instead of guessing
    pub allow_input_requests: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            model_timeout: Duration::from_secs(30),
            preserve_thinking_tags: false,
            concurrent_tools: false,
            allow_input_requests: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration bound
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the per-model-call deadline
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Keep thinking markup in final text
    pub fn with_preserved_thinking_tags(mut self) -> Self {
        self.preserve_thinking_tags = true;
        self
    }

    /// Execute same-turn tool calls concurrently
    pub fn with_concurrent_tools(mut self) -> Self {
        self.concurrent_tools = true;
        self
    }

    /// Expose the input-request tool
    pub fn with_input_requests(mut self) -> Self {
        self.allow_input_requests = true;
        self
    }
}

/// How one reasoning loop run ended
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoopEnd {
    /// The model produced final text
    Completed { text: String },

    /// The iteration bound ran out; `text` is the best available fallback
    Exhausted { text: String },

    /// The agent asked for missing input
    InputRequired { prompt: String },

    /// The model call transport failed; fatal to this loop only
    TransportFailed { error: String },

    /// External cancellation observed between iterations
    Cancelled,
}

/// Run the bounded reasoning loop over a conversation history
///
/// The loop owns `history` for its duration and strictly appends: the
/// model's text turns and one tool-results message per tool-calling turn,
/// results in request order. Tool failures of every kind are fed back as
/// structured error results; only a model transport failure ends the loop
/// abnormally.
pub(crate) async fn run_reasoning_loop(
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    tenant: &TenantContext,
    system_prompt: &str,
    history: &mut Vec<Message>,
    config: &RuntimeConfig,
    cancel: &CancellationToken,
) -> LoopEnd {
    let mut tools = registry.to_model_format();
    if config.allow_input_requests {
        tools.push(input_request_descriptor());
    }

    for iteration in 0..config.max_iterations {
        if cancel.is_cancelled() {
            return LoopEnd::Cancelled;
        }

        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            history: history.clone(),
            tools: tools.clone(),
        };

        let response = match tokio::time::timeout(config.model_timeout, llm.complete(request)).await
        {
            Err(_) => {
                return LoopEnd::TransportFailed {
                    error: "model call exceeded its deadline".to_string(),
                }
            }
            Ok(Err(err)) => {
                return LoopEnd::TransportFailed {
                    error: err.to_string(),
                }
            }
            Ok(Ok(response)) => response,
        };

        debug!(
            iteration,
            tool_calls = response.tool_calls.len(),
            has_text = response.text.is_some(),
            "model turn"
        );

        if response.tool_calls.is_empty() {
            return match response.text.as_deref().map(str::trim) {
                Some(text) if !text.is_empty() => {
                    let text = if config.preserve_thinking_tags {
                        text.to_string()
                    } else {
                        strip_thinking_tags(text)
                    };
                    history.push(Message::agent(text.clone()));
                    LoopEnd::Completed { text }
                }
                _ => {
                    history.push(Message::agent(UNEXPECTED_RESPONSE_TEXT));
                    LoopEnd::Completed {
                        text: UNEXPECTED_RESPONSE_TEXT.to_string(),
                    }
                }
            };
        }

        if let Some(text) = response.text.as_deref() {
            let text = text.trim();
            if !text.is_empty() {
                history.push(Message::agent(text));
            }
        }

        // a turn that requests input parks the task before executing any
        // sibling calls
        if config.allow_input_requests {
            if let Some(call) = response
                .tool_calls
                .iter()
                .find(|call| call.name == INPUT_REQUEST_TOOL)
            {
                let prompt = call
                    .input
                    .get("prompt")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Additional input is required to continue.")
                    .to_string();
                return LoopEnd::InputRequired { prompt };
            }
        }

        let results = execute_tool_calls(
            registry,
            tenant,
            &response.tool_calls,
            config.concurrent_tools,
        )
        .await;
        history.push(Message::tool_results(results));
    }

    let fallback = history
        .iter()
        .rev()
        .filter(|m| m.role == Role::Agent)
        .find_map(Message::text)
        .unwrap_or_else(|| EXHAUSTED_FALLBACK_TEXT.to_string());
    LoopEnd::Exhausted { text: fallback }
}

/// Execute one turn's tool calls and collect results in request order
async fn execute_tool_calls(
    registry: &ToolRegistry,
    tenant: &TenantContext,
    calls: &[crate::llm::ToolCall],
    concurrent: bool,
) -> Vec<(String, serde_json::Value)> {
    let run_one = |call: &crate::llm::ToolCall| {
        let id = call.id.clone();
        let name = call.name.clone();
        let input = call.input.clone();
        async move {
            let content = match registry.invoke(&name, tenant, input).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(tool = %name, code = %err.code, "tool call failed, feeding error back");
                    err.to_result_content()
                }
            };
            (id, content)
        }
    };

    if concurrent && calls.len() > 1 {
        // join_all yields results in input order regardless of completion order
        futures::future::join_all(calls.iter().map(run_one)).await
    } else {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(run_one(call).await);
        }
        results
    }
}

fn input_request_descriptor() -> ModelToolDescriptor {
    ModelToolDescriptor {
        name: INPUT_REQUEST_TOOL.to_string(),
        description: "Pause this task and ask the requester for missing input.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" }
            },
            "required": ["prompt"]
        }),
    }
}

/// Remove `<thinking>…</thinking>` spans from final text
///
/// An unclosed tag strips to the end of the text.
pub(crate) fn strip_thinking_tags(text: &str) -> String {
    const OPEN: &str = "<thinking>";
    const CLOSE: &str = "</thinking>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        match rest[start + OPEN.len()..].find(CLOSE) {
            Some(end) => rest = &rest[start + OPEN.len() + end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// One specialist agent: card, tool set and reasoning loop
///
/// The runtime has exclusive write access to a task's status and history
/// while processing it; callers only ever see the terminal task it hands
/// back.
pub struct AgentRuntime {
    card: AgentCard,
    system_prompt: String,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    publisher: EventPublisher,
    config: RuntimeConfig,
}

impl AgentRuntime {
    /// Create a new agent runtime
    pub fn new(
        card: AgentCard,
        system_prompt: impl Into<String>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        publisher: EventPublisher,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            card,
            system_prompt: system_prompt.into(),
            registry,
            llm,
            publisher,
            config,
        }
    }

    /// The capability descriptor this agent publishes
    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Process a task request to a terminal (or input-required) task
    ///
    /// Never errs outward: whatever happens inside the loop, the caller
    /// gets back a task that has stopped moving.
    pub async fn execute(
        &self,
        request: TaskRequest,
        tenant: &TenantContext,
        cancel: CancellationToken,
    ) -> Task {
        let mut task = Task::new(request.context_id, self.card.name.clone(), request.message);
        info!(agent = %self.card.name, task_id = %task.id, "task accepted");
        self.publisher.emit(&task.as_transition());

        self.transition(&mut task, TaskStatus::Working, None);
        self.run(task, tenant, cancel).await
    }

    /// Resume a task parked in `input-required` with the supplied input
    pub async fn resume(
        &self,
        mut task: Task,
        input: Message,
        tenant: &TenantContext,
        cancel: CancellationToken,
    ) -> MeshResult<Task> {
        if !task.requires_input() {
            return Err(MeshError::Validation(format!(
                "task {} is not awaiting input",
                task.id
            )));
        }

        self.transition(&mut task, TaskStatus::Working, None);
        task.append_message(input);
        Ok(self.run(task, tenant, cancel).await)
    }

    async fn run(&self, mut task: Task, tenant: &TenantContext, cancel: CancellationToken) -> Task {
        let mut history = std::mem::take(&mut task.history);
        let end = run_reasoning_loop(
            self.llm.as_ref(),
            &self.registry,
            tenant,
            &self.system_prompt,
            &mut history,
            &self.config,
            &cancel,
        )
        .await;
        task.history = history;

        match end {
            LoopEnd::Completed { text } | LoopEnd::Exhausted { text } => {
                self.transition(&mut task, TaskStatus::Completed, Some(Message::agent(text)));
            }
            LoopEnd::InputRequired { prompt } => {
                let message = Message::agent(prompt);
                task.append_message(message.clone());
                self.transition(&mut task, TaskStatus::InputRequired, Some(message));
            }
            LoopEnd::TransportFailed { error: cause } => {
                warn!(agent = %self.card.name, task_id = %task.id, error = %cause, "task failed");
                self.transition(&mut task, TaskStatus::Failed, Some(Message::agent(cause)));
            }
            LoopEnd::Cancelled => {
                self.transition(&mut task, TaskStatus::Cancelled, None);
            }
        }

        task
    }

    fn transition(&self, task: &mut Task, status: TaskStatus, message: Option<Message>) {
        match task.transition(status, message) {
            Ok(transition) => self.publisher.emit(&transition),
            Err(err) => {
                // lifecycle invariant violation: fatal to this task only
                error!(task_id = %task.id, error = %err, "illegal transition attempt");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use url::Url;

    use crate::{
        llm::{script::FnModel, script::ScriptedModel, MockLlmClient, ModelResponse, ToolCall},
        protocol::error::ToolError,
        tool::{ToolHandler, ToolSpec},
    };

    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn execute(&self, _tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
            Ok(json!({ "echo": input }))
        }
    }

    fn echo_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(ToolSpec::new(
            "echo",
            "Echo the input back",
            json!({"type": "object", "properties": {}}),
            Arc::new(Echo),
        ));
        Arc::new(registry)
    }

    fn card() -> AgentCard {
        AgentCard::new(
            "echo-agent",
            "Echoes things",
            Url::parse("http://localhost:7401").unwrap(),
        )
    }

    fn runtime(llm: Arc<dyn LlmClient>, config: RuntimeConfig) -> AgentRuntime {
        AgentRuntime::new(
            card(),
            "You are a test agent.",
            echo_registry(),
            llm,
            EventPublisher::new(),
            config,
        )
    }

    fn request() -> TaskRequest {
        TaskRequest::new("ctx-1", Message::user("do the thing"))
    }

    #[tokio::test]
    async fn test_happy_path_tool_then_text() {
        let llm = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new("echo", json!({"n": 1}))]),
            ModelResponse::text("all done"),
        ]));
        let runtime = runtime(llm, RuntimeConfig::default());

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_text(), Some("all done".to_string()));
        // initiating message, tool results, final text
        assert_eq!(task.history.len(), 3);
    }

    #[tokio::test]
    async fn test_bounded_loop_always_tool_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let llm = Arc::new(FnModel::new(move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ModelResponse::tool_calls(vec![ToolCall::new(
                "echo",
                json!({}),
            )]))
        }));
        let config = RuntimeConfig::default().with_max_iterations(4);
        let runtime = runtime(llm, config);

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        // terminates within the bound and still completes with a fallback
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_text(), Some(EXHAUSTED_FALLBACK_TEXT.to_string()));
    }

    #[tokio::test]
    async fn test_exhausted_falls_back_to_last_agent_text() {
        let llm = Arc::new(FnModel::new(|_req| {
            Ok(
                ModelResponse::tool_calls(vec![ToolCall::new("echo", json!({}))])
                    .with_text("working on it"),
            )
        }));
        let config = RuntimeConfig::default().with_max_iterations(2);
        let runtime = runtime(llm, config);

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_text(), Some("working on it".to_string()));
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back_not_raised() {
        let llm = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new("no_such_tool", json!({}))]),
            ModelResponse::text("recovered"),
        ]));
        let runtime = runtime(llm, RuntimeConfig::default());

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(task.status, TaskStatus::Completed);
        let tool_turn = &task.history[1];
        match &tool_turn.parts[0] {
            crate::protocol::message::MessagePart::ToolResult { content, .. } => {
                assert_eq!(content["code"], "UNKNOWN_TOOL");
            }
            _ => panic!("Expected tool result part"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_fails_task() {
        let mut mock = MockLlmClient::new();
        mock.expect_complete()
            .returning(|_| Err(MeshError::Transport("connection reset".to_string())));
        let runtime = runtime(Arc::new(mock), RuntimeConfig::default());

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task
            .status_message
            .as_ref()
            .and_then(Message::text)
            .unwrap()
            .contains("connection reset"));
    }

    #[tokio::test]
    async fn test_garbled_response_is_recoverable() {
        let llm = Arc::new(ScriptedModel::new(vec![ModelResponse::default()]));
        let runtime = runtime(llm, RuntimeConfig::default());

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_text(), Some(UNEXPECTED_RESPONSE_TEXT.to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_observed_before_first_iteration() {
        let llm = Arc::new(ScriptedModel::new(vec![ModelResponse::text("never seen")]));
        let runtime = runtime(llm, RuntimeConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let task = runtime
            .execute(request(), &TenantContext::new("acme"), cancel)
            .await;

        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_two_calls_one_turn_results_in_request_order() {
        for concurrent in [false, true] {
            let llm = Arc::new(ScriptedModel::new(vec![
                ModelResponse::tool_calls(vec![
                    ToolCall {
                        id: "call-a".to_string(),
                        name: "echo".to_string(),
                        input: json!({"seq": "a"}),
                    },
                    ToolCall {
                        id: "call-b".to_string(),
                        name: "echo".to_string(),
                        input: json!({"seq": "b"}),
                    },
                ]),
                ModelResponse::text("done"),
            ]));
            let mut config = RuntimeConfig::default();
            config.concurrent_tools = concurrent;
            let runtime = runtime(llm, config);

            let task = runtime
                .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
                .await;

            let tool_turn = &task.history[1];
            assert_eq!(tool_turn.parts.len(), 2);
            let ids: Vec<&str> = tool_turn
                .parts
                .iter()
                .map(|part| match part {
                    crate::protocol::message::MessagePart::ToolResult { tool_use_id, .. } => {
                        tool_use_id.as_str()
                    }
                    _ => panic!("Expected tool result part"),
                })
                .collect();
            assert_eq!(ids, vec!["call-a", "call-b"]);
        }
    }

    #[tokio::test]
    async fn test_input_required_and_resume() {
        let llm = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new(
                INPUT_REQUEST_TOOL,
                json!({"prompt": "Which order?"}),
            )]),
            ModelResponse::text("handled ORD-2"),
        ]));
        let config = RuntimeConfig::default().with_input_requests();
        let runtime = runtime(llm, config);
        let tenant = TenantContext::new("acme");

        let task = runtime
            .execute(request(), &tenant, CancellationToken::new())
            .await;
        assert_eq!(task.status, TaskStatus::InputRequired);
        assert!(task.status_message.is_some());

        let task = runtime
            .resume(task, Message::user("ORD-2"), &tenant, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_text(), Some("handled ORD-2".to_string()));
    }

    #[tokio::test]
    async fn test_resume_rejects_non_parked_task() {
        let llm = Arc::new(ScriptedModel::new(vec![ModelResponse::text("done")]));
        let runtime = runtime(llm, RuntimeConfig::default());
        let tenant = TenantContext::new("acme");

        let task = runtime
            .execute(request(), &tenant, CancellationToken::new())
            .await;
        let err = runtime
            .resume(task, Message::user("more"), &tenant, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
    }

    #[tokio::test]
    async fn test_thinking_tags_stripped_by_default() {
        let llm = Arc::new(ScriptedModel::new(vec![ModelResponse::text(
            "<thinking>secret plan</thinking>The refund is on its way.",
        )]));
        let runtime = runtime(llm, RuntimeConfig::default());

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;
        assert_eq!(task.final_text(), Some("The refund is on its way.".to_string()));
    }

    #[tokio::test]
    async fn test_thinking_tags_preserved_when_configured() {
        let text = "<thinking>secret plan</thinking>The refund is on its way.";
        let llm = Arc::new(ScriptedModel::new(vec![ModelResponse::text(text)]));
        let config = RuntimeConfig::default().with_preserved_thinking_tags();
        let runtime = runtime(llm, config);

        let task = runtime
            .execute(request(), &TenantContext::new("acme"), CancellationToken::new())
            .await;
        assert_eq!(task.final_text(), Some(text.to_string()));
    }

    #[test]
    fn test_strip_thinking_tags() {
        assert_eq!(strip_thinking_tags("plain"), "plain");
        assert_eq!(strip_thinking_tags("<thinking>a</thinking>b"), "b");
        assert_eq!(
            strip_thinking_tags("x <thinking>a</thinking>y<thinking>b</thinking> z"),
            "x y z"
        );
        assert_eq!(strip_thinking_tags("keep<thinking>unclosed"), "keep");
    }
}
