//! Task dispatch: the request/response channel between supervisor and
//! specialist agents
//!
//! A [`Dispatcher`] carries one task request to its target agent and blocks
//! until that agent's task stops moving. [`DispatchService`] wraps any
//! dispatcher in a Tower `Service` so cross-cutting concerns (validation,
//! deadlines) compose as layers.

pub mod http;
pub mod local;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_service::Service;

use crate::{
    protocol::{error::MeshError, message::Message, task::Task},
    tool::TenantContext,
};

pub use http::HttpDispatcher;
pub use local::LocalDispatcher;

/// A task request as it travels to a specialist agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRequest {
    /// Context grouping this delegation with its siblings
    #[serde(rename = "contextId")]
    pub context_id: String,

    /// The initiating message
    pub message: Message,
}

impl TaskRequest {
    /// Create a task request
    pub fn new(context_id: impl Into<String>, message: Message) -> Self {
        Self {
            context_id: context_id.into(),
            message,
        }
    }
}

/// Trusted execution context accompanying a dispatch
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Tenant the delegation acts on behalf of
    pub tenant: TenantContext,

    /// Deadline for the whole delegated task
    pub timeout: Duration,

    /// Cancellation signal observed by the target agent between iterations
    pub cancel: CancellationToken,
}

impl DispatchContext {
    /// Create a dispatch context with the default 120 second deadline
    pub fn new(tenant: TenantContext) -> Self {
        Self {
            tenant,
            timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the delegation deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A fully addressed dispatch: target agent, request and context
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Name of the target agent
    pub agent_id: String,

    /// The task request to deliver
    pub request: TaskRequest,

    /// Trusted execution context
    pub context: DispatchContext,
}

impl DispatchRequest {
    /// Create a dispatch request
    pub fn new(agent_id: impl Into<String>, request: TaskRequest, context: DispatchContext) -> Self {
        Self {
            agent_id: agent_id.into(),
            request,
            context,
        }
    }
}

/// Carries a task request to its target agent over some channel
///
/// Implementations block until the delegated task reaches a state where it
/// has stopped moving (terminal or input-required) and return that task.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Deliver the request and await the resulting task
    async fn dispatch(&self, request: DispatchRequest) -> Result<Task, MeshError>;
}

/// Tower service executing dispatches with a per-request deadline
///
/// Exceeding the deadline surfaces as [`MeshError::Timeout`], fatal to this
/// delegation only; sibling delegations are unaffected.
pub struct DispatchService<D> {
    dispatcher: D,
}

impl<D> DispatchService<D>
where
    D: Dispatcher + Clone,
{
    /// Create a dispatch service over a dispatcher
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }
}

impl<D> Service<DispatchRequest> for DispatchService<D>
where
    D: Dispatcher + Clone,
{
    type Response = Task;
    type Error = MeshError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let deadline = req.context.timeout;

        Box::pin(async move {
            match tokio::time::timeout(deadline, dispatcher.dispatch(req)).await {
                Ok(result) => result,
                Err(_) => Err(MeshError::Timeout),
            }
        })
    }
}

impl<D> Clone for DispatchService<D>
where
    D: Clone,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}
