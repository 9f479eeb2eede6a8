//! Envelope validation layer for the dispatch channel
//!
//! Rejects structurally invalid task-message envelopes before they reach a
//! specialist agent, so every runtime can assume well-formed input.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower_layer::Layer;
use tower_service::Service;

use crate::{
    directory::validate_envelope,
    dispatch::DispatchRequest,
    protocol::{error::MeshError, task::Task},
};

/// Layer that validates dispatch requests
#[derive(Clone, Debug, Default)]
pub struct EnvelopeValidationLayer;

impl EnvelopeValidationLayer {
    /// Create a new validation layer
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for EnvelopeValidationLayer {
    type Service = EnvelopeValidationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EnvelopeValidationService { inner }
    }
}

/// Validation service that wraps an inner dispatch service
#[derive(Clone)]
pub struct EnvelopeValidationService<S> {
    inner: S,
}

impl<S> EnvelopeValidationService<S> {
    /// Validate a dispatch request
    fn validate_request(req: &DispatchRequest) -> Result<(), MeshError> {
        if req.agent_id.trim().is_empty() {
            return Err(MeshError::Validation("Agent id cannot be empty".into()));
        }
        validate_envelope(&req.request)
    }
}

impl<S> Service<DispatchRequest> for EnvelopeValidationService<S>
where
    S: Service<DispatchRequest, Response = Task, Error = MeshError> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Task;
    type Error = MeshError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        if let Err(e) = Self::validate_request(&req) {
            return Box::pin(async move { Err(e) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
