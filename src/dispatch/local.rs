//! In-process dispatcher
//!
//! Routes dispatches to [`AgentRuntime`]s living in the same process. This
//! is the default channel for tests, demos and single-process deployments;
//! the request/response contract is identical to the HTTP channel.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{
    protocol::{error::MeshError, task::Task},
    runtime::AgentRuntime,
};

use super::{DispatchRequest, Dispatcher};

/// Dispatcher over a registry of in-process agent runtimes
///
/// Cloning shares the registry. Agents are registered at startup, before
/// the supervisor's first model call.
#[derive(Clone, Default)]
pub struct LocalDispatcher {
    runtimes: Arc<RwLock<HashMap<String, Arc<AgentRuntime>>>>,
}

impl LocalDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runtime under its card name (last write wins)
    pub fn register(&self, runtime: Arc<AgentRuntime>) {
        let name = runtime.card().name.clone();
        let mut runtimes = self.runtimes.write().expect("runtime registry lock poisoned");
        runtimes.insert(name, runtime);
    }

    /// Names of all registered runtimes
    pub fn agent_ids(&self) -> Vec<String> {
        let runtimes = self.runtimes.read().expect("runtime registry lock poisoned");
        runtimes.keys().cloned().collect()
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Task, MeshError> {
        let runtime = {
            let runtimes = self.runtimes.read().expect("runtime registry lock poisoned");
            runtimes.get(&request.agent_id).cloned()
        };
        let runtime = runtime.ok_or(MeshError::AgentNotFound {
            agent_id: request.agent_id,
        })?;

        Ok(runtime
            .execute(
                request.request,
                &request.context.tenant,
                request.context.cancel,
            )
            .await)
    }
}

impl std::fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDispatcher")
            .field("agents", &self.agent_ids())
            .finish()
    }
}
