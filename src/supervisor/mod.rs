//! Supervisor orchestrator
//!
//! The top-level reasoning loop. An inbound delivery exception is classified
//! against the decision policy, then resolved by delegating to specialist
//! agents through the dispatch channel, one task per `invoke_agent` call.
//! The supervisor never mutates a task it delegated; it only reads terminal
//! results, and it always terminates with a [`ResolutionSummary`].

pub mod policy;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    directory::AgentDirectory,
    dispatch::{DispatchContext, DispatchRequest, TaskRequest},
    llm::LlmClient,
    protocol::{
        error::{MeshError, ToolError},
        message::Message,
        task::{Task, TaskStatus},
    },
    runtime::{run_reasoning_loop, LoopEnd, RuntimeConfig},
    store::{HistoryStore, RecordStore},
    supervisor::policy::DecisionPolicy,
    tool::{domain::NotifyCustomer, required_str, TenantContext, ToolHandler, ToolRegistry, ToolSpec},
};

/// An inbound delivery exception
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionEvent {
    /// The affected delivery
    #[serde(rename = "deliveryId")]
    pub delivery_id: String,

    /// Context grouping every task and event of this resolution
    #[serde(rename = "contextId")]
    pub context_id: String,

    /// What went wrong
    pub status: ExceptionStatus,

    /// Value of the affected order, when known
    #[serde(rename = "orderValue", skip_serializing_if = "Option::is_none")]
    pub order_value: Option<f64>,
}

/// Status block of an exception event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionStatus {
    /// Short status label (e.g. "Customer Not Home")
    pub status: String,

    /// Free-text reason, typically driver notes
    pub reason: String,
}

impl ExceptionEvent {
    /// Create an exception event
    pub fn new(
        delivery_id: impl Into<String>,
        context_id: impl Into<String>,
        status: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            context_id: context_id.into(),
            status: ExceptionStatus {
                status: status.into(),
                reason: reason.into(),
            },
            order_value: None,
        }
    }

    /// Attach the affected order's value
    pub fn with_order_value(mut self, value: f64) -> Self {
        self.order_value = Some(value);
        self
    }

    /// The text the policy table is matched against
    pub fn signal_text(&self) -> String {
        format!("{} {}", self.status.status, self.status.reason)
    }
}

/// Terminal output of one resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionSummary {
    /// Signal label the exception classified as
    pub classification: String,

    /// Agents delegated to, in invocation order
    #[serde(rename = "agentsInvoked")]
    pub agents_invoked: Vec<String>,

    /// Actions that completed successfully
    #[serde(rename = "actionsCompleted")]
    pub actions_completed: Vec<String>,

    /// Overall resolution status
    pub status: ResolutionStatus,

    /// Customer-facing summary of the outcome
    #[serde(rename = "customerImpact")]
    pub customer_impact: String,
}

/// Overall status of a resolution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// The exception was resolved
    Resolved,

    /// A delegation is parked awaiting input
    Pending,

    /// A human needs to look at this case
    RequiresFollowUp,
}

/// How multiple `invoke_agent` calls in one model turn are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One blocking round trip per call, in request order
    #[default]
    Sequential,

    /// Concurrent dispatch with results re-assembled in request order
    Concurrent,
}

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Upper bound on supervisor model turns per resolution
    pub max_iterations: usize,

    /// Deadline for each supervisor model call
    pub model_timeout: Duration,

    /// Deadline for each delegated task
    pub task_timeout: Duration,

    /// Same-turn dispatch behavior
    pub dispatch_mode: DispatchMode,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            model_timeout: Duration::from_secs(30),
            task_timeout: Duration::from_secs(120),
            dispatch_mode: DispatchMode::Sequential,
        }
    }
}

impl SupervisorConfig {
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

    /// Set the per-delegation deadline
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the same-turn dispatch behavior
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }
}

/// Outcome of one delegation, tracked in invocation order
#[derive(Debug, Clone)]
struct AgentOutcome {
    agent_id: String,
    ok: bool,
    pending: bool,
    detail: String,
}

/// The supervisor orchestrator
///
/// Generic over the dispatch service so the same loop drives in-process,
/// HTTP or layered dispatch stacks.
pub struct Supervisor<S> {
    llm: Arc<dyn LlmClient>,
    service: S,
    directory: AgentDirectory,
    store: Arc<dyn RecordStore>,
    history: Option<Arc<dyn HistoryStore>>,
    policy: DecisionPolicy,
    config: SupervisorConfig,
}

impl<S> Supervisor<S>
where
    S: Service<DispatchRequest, Response = Task, Error = MeshError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Create a supervisor with the default decision policy
    pub fn new(
        llm: Arc<dyn LlmClient>,
        service: S,
        directory: AgentDirectory,
        store: Arc<dyn RecordStore>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            llm,
            service,
            directory,
            store,
            history: None,
            policy: DecisionPolicy::default(),
            config,
        }
    }

    /// Replace the decision policy table
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist conversation history per context through the given store
    ///
    /// A later exception carrying an already-seen context id resumes on top
    /// of the stored conversation instead of starting cold.
    pub fn with_history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Resolve one delivery exception
    ///
    /// Infallible outward: transport failures, exhausted iteration bounds
    /// and cancellation all degrade to a `requires_follow_up` summary with
    /// the customer notified, never a silent unresolved exception.
    pub async fn resolve(
        &self,
        exception: ExceptionEvent,
        tenant: &TenantContext,
        cancel: CancellationToken,
    ) -> ResolutionSummary {
        let context_id = if exception.context_id.trim().is_empty() {
            Uuid::now_v7().to_string()
        } else {
            exception.context_id.clone()
        };

        let classification = self
            .policy
            .classify(&exception.signal_text(), exception.order_value)
            .map(|rule| rule.signal.clone())
            .unwrap_or_else(|| "unclassified".to_string());
        info!(
            delivery_id = %exception.delivery_id,
            context_id = %context_id,
            classification = %classification,
            "resolving delivery exception"
        );

        let tracker: Arc<Mutex<Vec<AgentOutcome>>> = Arc::new(Mutex::new(Vec::new()));
        let registry = self.build_registry(&context_id, &cancel, &tracker);

        let system_prompt = self.system_prompt();
        let mut history = Vec::new();
        if let Some(store) = &self.history {
            match store.load_history(&context_id).await {
                Ok(prior) => history.extend(prior),
                Err(err) => warn!(context_id = %context_id, error = %err, "could not load history"),
            }
        }
        let prior_len = history.len();
        history.push(Message::user(exception_prompt(&exception, &classification)));

        let mut loop_config = RuntimeConfig::default()
            .with_max_iterations(self.config.max_iterations)
            .with_model_timeout(self.config.model_timeout);
        if self.config.dispatch_mode == DispatchMode::Concurrent {
            loop_config = loop_config.with_concurrent_tools();
        }

        let end = run_reasoning_loop(
            self.llm.as_ref(),
            &registry,
            tenant,
            &system_prompt,
            &mut history,
            &loop_config,
            &cancel,
        )
        .await;

        if let Some(store) = &self.history {
            if let Err(err) = store.append_history(&context_id, &history[prior_len..]).await {
                warn!(context_id = %context_id, error = %err, "could not persist history");
            }
        }

        self.summarize(end, exception, classification, tenant, &registry, &tracker)
            .await
    }

    fn build_registry(
        &self,
        context_id: &str,
        cancel: &CancellationToken,
        tracker: &Arc<Mutex<Vec<AgentOutcome>>>,
    ) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec::new(
                "invoke_agent",
                "Delegate a sub-task to a specialist agent and wait for its result.",
                json!({
                    "type": "object",
                    "properties": {
                        "agentId": { "type": "string" },
                        "message": { "type": "string" }
                    },
                    "required": ["agentId", "message"]
                }),
                Arc::new(InvokeAgentTool {
                    service: Mutex::new(self.service.clone()),
                    context_id: context_id.to_string(),
                    timeout: self.config.task_timeout,
                    cancel: cancel.clone(),
                    tracker: tracker.clone(),
                }),
            )
            .multi_tenant(),
        );
        registry.register(NotifyCustomer::spec(self.store.clone()));
        registry
    }

    fn system_prompt(&self) -> String {
        let agents = self
            .directory
            .list()
            .into_iter()
            .map(|card| {
                let skills = card
                    .skills
                    .iter()
                    .map(|skill| skill.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                if skills.is_empty() {
                    format!("- {}: {}", card.name, card.description)
                } else {
                    format!("- {}: {} (skills: {})", card.name, card.description, skills)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are the delivery exception supervisor for a fulfillment network.\n\
             Resolve the incoming exception by delegating to the specialist agents below, \
             one invoke_agent call per delegation. The decision policy is the source of \
             truth for strategy; follow the row matching the exception. If no row matches, \
             notify the customer directly and take no other action.\n\n\
             Decision policy:\n{policy}\n\n\
             Available agents:\n{agents}\n\n\
             When the resolution is complete, reply with a short plain-text summary of the \
             customer impact.",
            policy = self.policy.render(),
            agents = agents,
        )
    }

    async fn summarize(
        &self,
        end: LoopEnd,
        exception: ExceptionEvent,
        classification: String,
        tenant: &TenantContext,
        registry: &ToolRegistry,
        tracker: &Arc<Mutex<Vec<AgentOutcome>>>,
    ) -> ResolutionSummary {
        let outcomes = tracker.lock().expect("outcome tracker lock poisoned").clone();
        let agents_invoked: Vec<String> =
            outcomes.iter().map(|o| o.agent_id.clone()).collect();
        let mut actions_completed: Vec<String> = outcomes
            .iter()
            .filter(|o| o.ok)
            .map(|o| o.detail.clone())
            .collect();

        // a failure counts against the resolution unless the same agent
        // later succeeded (the model retried or substituted)
        let unrecovered_failure = outcomes.iter().enumerate().any(|(i, o)| {
            !o.ok
                && !o.pending
                && !outcomes[i + 1..]
                    .iter()
                    .any(|later| later.agent_id == o.agent_id && later.ok)
        });
        let any_pending = outcomes.iter().any(|o| o.pending);

        let (status, customer_impact, notify_fallback) = match end {
            LoopEnd::Completed { text } => {
                let status = if unrecovered_failure {
                    ResolutionStatus::RequiresFollowUp
                } else if any_pending {
                    ResolutionStatus::Pending
                } else {
                    ResolutionStatus::Resolved
                };
                (status, text, false)
            }
            LoopEnd::Exhausted { text } => (ResolutionStatus::RequiresFollowUp, text, true),
            LoopEnd::InputRequired { prompt } => (ResolutionStatus::Pending, prompt, false),
            LoopEnd::TransportFailed { error: cause } => {
                warn!(delivery_id = %exception.delivery_id, error = %cause, "resolution aborted");
                (
                    ResolutionStatus::RequiresFollowUp,
                    "We hit an internal problem while resolving this delivery; our team will \
                     follow up."
                        .to_string(),
                    true,
                )
            }
            LoopEnd::Cancelled => (
                ResolutionStatus::RequiresFollowUp,
                "The resolution was cancelled before it finished.".to_string(),
                true,
            ),
        };

        // the customer always receives a closing communication, even when
        // the loop died before the model could send one
        if notify_fallback {
            let input = json!({
                "deliveryId": exception.delivery_id,
                "message": "We ran into an issue resolving your delivery and a support agent \
                            will follow up shortly.",
            });
            match registry.invoke("notify_customer", tenant, input).await {
                Ok(_) => actions_completed.push("notified customer of an open issue".to_string()),
                Err(err) => {
                    warn!(code = %err.code, "fallback customer notification failed");
                }
            }
        }

        ResolutionSummary {
            classification,
            agents_invoked,
            actions_completed,
            status,
            customer_impact,
        }
    }
}

/// Prompt describing the exception's structured fields to the model
fn exception_prompt(exception: &ExceptionEvent, classification: &str) -> String {
    let order_value = exception
        .order_value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "A delivery exception needs resolution.\n\
         deliveryId: {}\n\
         status: {}\n\
         reason: {}\n\
         orderValue: {}\n\
         preliminary classification: {}",
        exception.delivery_id,
        exception.status.status,
        exception.status.reason,
        order_value,
        classification,
    )
}

/// Tool handler delegating one sub-task over the dispatch service
struct InvokeAgentTool<S> {
    service: Mutex<S>,
    context_id: String,
    timeout: Duration,
    cancel: CancellationToken,
    tracker: Arc<Mutex<Vec<AgentOutcome>>>,
}

impl<S> InvokeAgentTool<S> {
    fn record(&self, agent_id: &str, ok: bool, pending: bool, detail: String) {
        self.tracker
            .lock()
            .expect("outcome tracker lock poisoned")
            .push(AgentOutcome {
                agent_id: agent_id.to_string(),
                ok,
                pending,
                detail,
            });
    }
}

#[async_trait]
impl<S> ToolHandler for InvokeAgentTool<S>
where
    S: Service<DispatchRequest, Response = Task, Error = MeshError> + Send + 'static,
    S::Future: Send,
{
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant
            .ok_or_else(|| ToolError::new("TENANT_REQUIRED", "delegation requires tenant context"))?;
        let agent_id = required_str(&input, "agentId")?.to_string();
        let text = required_str(&input, "message")?;

        let request = DispatchRequest::new(
            agent_id.clone(),
            TaskRequest::new(self.context_id.clone(), Message::user(text)),
            DispatchContext::new(TenantContext::new(tenant))
                .with_timeout(self.timeout)
                .with_cancel(self.cancel.child_token()),
        );

        // Service::call produces the future synchronously; the lock is
        // released before awaiting
        let future = {
            let mut service = self.service.lock().expect("dispatch service lock poisoned");
            service.call(request)
        };

        let task = match future.await {
            Ok(task) => task,
            Err(err) => {
                let tool_error = match err {
                    MeshError::Timeout => ToolError::new(
                        "DELEGATION_TIMEOUT",
                        format!("agent {agent_id} did not finish in time"),
                    ),
                    MeshError::AgentNotFound { agent_id } => ToolError::new(
                        "AGENT_NOT_FOUND",
                        format!("no agent registered under '{agent_id}'"),
                    ),
                    other => other.into_tool_error(),
                };
                self.record(&agent_id, false, false, tool_error.message.clone());
                return Err(tool_error);
            }
        };

        match task.status {
            TaskStatus::Completed => {
                let result = task.final_text().unwrap_or_default();
                self.record(&agent_id, true, false, format!("{agent_id} completed"));
                Ok(json!({
                    "agentId": agent_id,
                    "taskId": task.id,
                    "status": "completed",
                    "result": result,
                }))
            }
            TaskStatus::InputRequired => {
                let prompt = task
                    .status_message
                    .as_ref()
                    .and_then(Message::text)
                    .unwrap_or_else(|| "The agent needs more input.".to_string());
                self.record(&agent_id, false, true, format!("{agent_id} awaiting input"));
                Ok(json!({
                    "agentId": agent_id,
                    "taskId": task.id,
                    "status": "input-required",
                    "prompt": prompt,
                }))
            }
            TaskStatus::Cancelled => {
                self.record(&agent_id, false, false, format!("{agent_id} cancelled"));
                Err(ToolError::new(
                    "DELEGATION_CANCELLED",
                    format!("the task delegated to {agent_id} was cancelled"),
                ))
            }
            _ => {
                let detail = task
                    .status_message
                    .as_ref()
                    .and_then(Message::text)
                    .unwrap_or_else(|| "no detail".to_string());
                self.record(&agent_id, false, false, format!("{agent_id} failed: {detail}"));
                Err(ToolError::new(
                    "DELEGATION_FAILED",
                    format!("agent {agent_id} failed: {detail}"),
                )
                .with_details(json!({ "taskId": task.id })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use crate::{
        dispatch::{DispatchService, Dispatcher},
        llm::{script::ScriptedModel, ModelResponse, ToolCall},
        protocol::agent::AgentCard,
        store::MemoryStore,
    };

    use super::*;

    /// Dispatcher returning a scripted terminal task per agent
    ///
    /// Agents listed in `fail_once` fail their first delegation and succeed
    /// afterwards, so recovery paths can be exercised.
    #[derive(Clone)]
    struct StubDispatcher {
        fail_once: Arc<Mutex<Vec<String>>>,
    }

    impl StubDispatcher {
        fn new() -> Self {
            Self::failing(&[])
        }

        fn failing(agents: &[&str]) -> Self {
            Self {
                fail_once: Arc::new(Mutex::new(
                    agents.iter().map(|a| a.to_string()).collect(),
                )),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for StubDispatcher {
        async fn dispatch(&self, request: DispatchRequest) -> Result<Task, MeshError> {
            let should_fail = {
                let mut list = self.fail_once.lock().unwrap();
                match list.iter().position(|a| a == &request.agent_id) {
                    Some(pos) => {
                        list.remove(pos);
                        true
                    }
                    None => false,
                }
            };

            let mut task = Task::new(
                request.request.context_id,
                request.agent_id.clone(),
                request.request.message,
            );
            task.transition(TaskStatus::Working, None)?;
            if should_fail {
                task.transition(
                    TaskStatus::Failed,
                    Some(Message::agent("record store unavailable")),
                )?;
            } else {
                task.append_message(Message::agent(format!("{} done", request.agent_id)));
                task.transition(TaskStatus::Completed, None)?;
            }
            Ok(task)
        }
    }

    fn directory() -> AgentDirectory {
        let directory = AgentDirectory::new();
        for name in ["order-agent", "payment-agent", "warehouse-agent"] {
            directory.publish(AgentCard::new(
                name,
                "Specialist",
                Url::parse("http://localhost:7400").unwrap(),
            ));
        }
        directory
    }

    fn supervisor(
        responses: Vec<ModelResponse>,
        dispatcher: StubDispatcher,
        store: Arc<MemoryStore>,
    ) -> Supervisor<DispatchService<StubDispatcher>> {
        Supervisor::new(
            Arc::new(ScriptedModel::new(responses)),
            DispatchService::new(dispatcher),
            directory(),
            store,
            SupervisorConfig::default().with_max_iterations(5),
        )
    }

    fn invoke(agent: &str) -> ToolCall {
        ToolCall::new(
            "invoke_agent",
            json!({"agentId": agent, "message": format!("handle your part, {agent}")}),
        )
    }

    fn exception() -> ExceptionEvent {
        ExceptionEvent::new("DEL-1", "ctx-1", "Package Damaged", "crushed box")
            .with_order_value(250.0)
    }

    #[tokio::test]
    async fn test_direct_resolution_without_delegation() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = supervisor(
            vec![ModelResponse::text("No action needed; notified nobody.")],
            StubDispatcher::new(),
            store,
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::Resolved);
        assert!(summary.agents_invoked.is_empty());
        assert_eq!(summary.classification, "high_value_damaged_or_lost");
    }

    #[tokio::test]
    async fn test_sequential_delegations_tracked_in_order() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = supervisor(
            vec![
                ModelResponse::tool_calls(vec![invoke("payment-agent")]),
                ModelResponse::tool_calls(vec![invoke("warehouse-agent")]),
                ModelResponse::tool_calls(vec![invoke("order-agent")]),
                ModelResponse::text("Refunded, restocked and recreated."),
            ],
            StubDispatcher::new(),
            store,
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::Resolved);
        assert_eq!(
            summary.agents_invoked,
            vec!["payment-agent", "warehouse-agent", "order-agent"]
        );
        assert_eq!(summary.actions_completed.len(), 3);
    }

    #[tokio::test]
    async fn test_delegated_failure_requires_follow_up() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = supervisor(
            vec![
                ModelResponse::tool_calls(vec![invoke("payment-agent")]),
                ModelResponse::text("Could not refund; a human will follow up."),
            ],
            StubDispatcher::failing(&["payment-agent"]),
            store,
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::RequiresFollowUp);
        assert_eq!(summary.agents_invoked, vec!["payment-agent"]);
        assert!(summary.actions_completed.is_empty());
    }

    #[tokio::test]
    async fn test_failure_recovered_by_retry_resolves() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = supervisor(
            vec![
                ModelResponse::tool_calls(vec![invoke("payment-agent")]),
                ModelResponse::tool_calls(vec![invoke("payment-agent")]),
                ModelResponse::text("Refund went through on retry."),
            ],
            StubDispatcher::failing(&["payment-agent"]),
            store,
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;
        assert_eq!(summary.status, ResolutionStatus::Resolved);
        assert_eq!(summary.agents_invoked.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_bound_notifies_customer() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            Arc::new(crate::llm::script::FnModel::new(|_req| {
                Ok(ModelResponse::tool_calls(vec![invoke("order-agent")]))
            })),
            DispatchService::new(StubDispatcher::new()),
            directory(),
            store.clone(),
            SupervisorConfig::default().with_max_iterations(2),
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::RequiresFollowUp);
        assert!(summary
            .actions_completed
            .iter()
            .any(|action| action.contains("notified customer")));

        // the fallback notification was recorded on the case
        let record = store
            .get("acme", "notification:DEL-1")
            .await
            .unwrap()
            .expect("notification record");
        assert_eq!(record.value.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_still_summarizes() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            Arc::new(ScriptedModel::from_results(vec![Err(MeshError::Transport(
                "model gateway down".to_string(),
            ))])),
            DispatchService::new(StubDispatcher::new()),
            directory(),
            store,
            SupervisorConfig::default(),
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::RequiresFollowUp);
        assert!(summary
            .actions_completed
            .iter()
            .any(|action| action.contains("notified customer")));
    }

    #[tokio::test]
    async fn test_unclassifiable_exception() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = supervisor(
            vec![ModelResponse::text("Customer notified; nothing else to do.")],
            StubDispatcher::new(),
            store,
        );

        let summary = supervisor
            .resolve(
                ExceptionEvent::new("DEL-9", "ctx-9", "Weird", "unknown situation"),
                &TenantContext::new("acme"),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.classification, "unclassified");
        assert_eq!(summary.status, ResolutionStatus::Resolved);
    }

    #[tokio::test]
    async fn test_concurrent_same_turn_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            Arc::new(ScriptedModel::new(vec![
                ModelResponse::tool_calls(vec![
                    invoke("payment-agent"),
                    invoke("warehouse-agent"),
                ]),
                ModelResponse::text("Refund and allocation both done."),
            ])),
            DispatchService::new(StubDispatcher::new()),
            directory(),
            store,
            SupervisorConfig::default().with_dispatch_mode(DispatchMode::Concurrent),
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::Resolved);
        assert_eq!(summary.agents_invoked.len(), 2);
        assert!(summary.agents_invoked.contains(&"payment-agent".to_string()));
        assert!(summary.agents_invoked.contains(&"warehouse-agent".to_string()));
    }

    /// Dispatcher parking every task as input-required
    #[derive(Clone)]
    struct ParkingDispatcher;

    #[async_trait]
    impl Dispatcher for ParkingDispatcher {
        async fn dispatch(&self, request: DispatchRequest) -> Result<Task, MeshError> {
            let mut task = Task::new(
                request.request.context_id,
                request.agent_id,
                request.request.message,
            );
            task.transition(TaskStatus::Working, None)?;
            let message = Message::agent("Which redelivery window works for the customer?");
            task.append_message(message.clone());
            task.transition(TaskStatus::InputRequired, Some(message))?;
            Ok(task)
        }
    }

    #[tokio::test]
    async fn test_parked_delegation_yields_pending() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            Arc::new(ScriptedModel::new(vec![
                ModelResponse::tool_calls(vec![invoke("order-agent")]),
                ModelResponse::text("Waiting on the customer's redelivery window."),
            ])),
            DispatchService::new(ParkingDispatcher),
            directory(),
            store,
            SupervisorConfig::default(),
        );

        let summary = supervisor
            .resolve(exception(), &TenantContext::new("acme"), CancellationToken::new())
            .await;

        assert_eq!(summary.status, ResolutionStatus::Pending);
        assert_eq!(summary.agents_invoked, vec!["order-agent"]);
    }

    #[tokio::test]
    async fn test_history_persists_across_resolutions() {
        let store = Arc::new(MemoryStore::new());
        let history = Arc::new(crate::store::MemoryHistoryStore::new());
        let supervisor = supervisor(
            vec![
                ModelResponse::text("First exception handled."),
                ModelResponse::text("Second exception handled."),
            ],
            StubDispatcher::new(),
            store,
        )
        .with_history_store(history.clone());

        let tenant = TenantContext::new("acme");
        supervisor
            .resolve(exception(), &tenant, CancellationToken::new())
            .await;
        let after_first = history.load_history("ctx-1").await.unwrap().len();
        assert!(after_first >= 2);

        supervisor
            .resolve(exception(), &tenant, CancellationToken::new())
            .await;
        let after_second = history.load_history("ctx-1").await.unwrap().len();
        assert!(after_second > after_first);
    }

    #[test]
    fn test_summary_wire_format() {
        let summary = ResolutionSummary {
            classification: "damaged_or_lost".to_string(),
            agents_invoked: vec!["payment-agent".to_string()],
            actions_completed: vec!["payment-agent completed".to_string()],
            status: ResolutionStatus::RequiresFollowUp,
            customer_impact: "Refund pending".to_string(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "requires_follow_up");
        assert_eq!(json["agentsInvoked"][0], "payment-agent");
        assert_eq!(json["actionsCompleted"][0], "payment-agent completed");
        assert_eq!(json["customerImpact"], "Refund pending");
    }
}
