//! HTTP dispatcher
//!
//! Carries task requests to remote specialist agents: one POST of the
//! request envelope to the endpoint advertised in the agent's card, blocking
//! until the terminal task comes back. The serving side of this exchange is
//! an ingress concern and lives outside this crate.

use async_trait::async_trait;

use crate::{
    directory::AgentDirectory,
    protocol::{agent::AgentCard, error::MeshError, task::Task},
};

use super::{DispatchRequest, Dispatcher};

/// Header carrying the trusted tenant id across the wire
const TENANT_HEADER: &str = "X-Tenant-Id";

/// Dispatcher that reaches agents over HTTP
///
/// Endpoints are resolved through the [`AgentDirectory`] at dispatch time,
/// so a re-published card takes effect without rebuilding the dispatcher.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    directory: AgentDirectory,
}

impl HttpDispatcher {
    /// Create a dispatcher resolving agents through the given directory
    pub fn new(directory: AgentDirectory) -> Self {
        Self {
            client: reqwest::Client::new(),
            directory,
        }
    }

    /// Task submission URL for an agent
    fn tasks_url(card: &AgentCard) -> String {
        format!("{}/tasks", card.endpoint.as_str().trim_end_matches('/'))
    }

    /// Map a non-success response to an error
    fn decode_error(status: u16, agent_id: &str, body: &[u8]) -> MeshError {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            });

        match status {
            400 => MeshError::Validation(
                message.unwrap_or_else(|| "agent rejected the task envelope".to_string()),
            ),
            404 => MeshError::AgentNotFound {
                agent_id: agent_id.to_string(),
            },
            _ => MeshError::Transport(format!(
                "HTTP {}: {}",
                status,
                message.unwrap_or_else(|| "dispatch failed".to_string())
            )),
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Task, MeshError> {
        let card = self
            .directory
            .describe(&request.agent_id)
            .ok_or(MeshError::AgentNotFound {
                agent_id: request.agent_id.clone(),
            })?;

        let response = self
            .client
            .post(Self::tasks_url(&card))
            .header(TENANT_HEADER, &request.context.tenant.tenant_id)
            .timeout(request.context.timeout)
            .json(&request.request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.bytes().await.unwrap_or_default();
            return Err(Self::decode_error(status, &request.agent_id, &body));
        }

        let task: Task = response.json().await?;
        Ok(task)
    }
}
