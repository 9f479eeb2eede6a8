//! Tool specifications and dispatch-by-name registry

pub mod domain;
pub mod registry;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::ToolError;

pub use registry::ToolRegistry;

/// Pull a required string property out of a tool input
pub(crate) fn required_str<'a>(input: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    input
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::new("INVALID_INPUT", format!("missing property '{name}'")))
}

/// Trusted tenant identity, constructed at the ingress boundary
///
/// Threaded by reference through every call boundary down to tool
/// invocation. Never derived from model output, so a prompt-injected tenant
/// id can never reach a multi-tenant tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// The tenant this request acts on behalf of
    pub tenant_id: String,
}

impl TenantContext {
    /// Create a tenant context
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }
}

/// One invocable tool implementation
///
/// Multi-tenant handlers receive `Some(tenant_id)` from the caller-supplied
/// [`TenantContext`]; single-tenant handlers receive `None`. Handlers report
/// failure as a structured [`ToolError`], which the registry feeds back to
/// the model rather than raising.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool against validated input
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError>;
}

/// A tool as owned by the registry: schema, handler and tenancy flag
#[derive(Clone)]
pub struct ToolSpec {
    /// Name the model uses to request this tool
    pub name: String,

    /// What the tool does, as shown to the model
    pub description: String,

    /// Structural JSON schema of the tool input
    pub input_schema: Value,

    /// Whether the handler is invoked with the trusted tenant id
    pub multi_tenant: bool,

    handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    /// Create a single-tenant tool spec
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            multi_tenant: false,
            handler,
        }
    }

    /// Mark this tool as multi-tenant
    pub fn multi_tenant(mut self) -> Self {
        self.multi_tenant = true;
        self
    }

    /// The handler backing this tool
    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }

    /// Project this spec into the form shown to the model
    ///
    /// Strips the handler and the tenancy flag; the model must never see
    /// implementation details or tenant context.
    pub fn to_descriptor(&self) -> ModelToolDescriptor {
        ModelToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("multi_tenant", &self.multi_tenant)
            .finish()
    }
}

/// A tool as seen by the model: name, description and input schema only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelToolDescriptor {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Structural input schema
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}
