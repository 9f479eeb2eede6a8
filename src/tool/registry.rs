//! Tool registry: dispatch by name, resolved once at startup

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::error::{MeshError, ToolError};

use super::{ModelToolDescriptor, TenantContext, ToolSpec};

/// Registry mapping tool names to specs
///
/// Populated at startup and read-only afterwards; safe to share behind an
/// `Arc` without locking. Unknown names are rejected explicitly at lookup
/// and surface to the model as tool errors, never as undefined behavior.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool spec under its name (last write wins)
    pub fn register(&mut self, spec: ToolSpec) {
        self.tools.insert(spec.name.clone(), spec);
    }

    /// Look up a tool by name
    pub fn resolve(&self, name: &str) -> Result<&ToolSpec, MeshError> {
        self.tools.get(name).ok_or_else(|| MeshError::UnknownTool {
            name: name.to_string(),
        })
    }

    /// Names of all registered tools
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Project every registered tool into its model-facing descriptor
    pub fn to_model_format(&self) -> Vec<ModelToolDescriptor> {
        let mut descriptors: Vec<ModelToolDescriptor> =
            self.tools.values().map(ToolSpec::to_descriptor).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Resolve, validate and execute one tool call
    ///
    /// The trusted tenant id is passed to the handler only when the spec is
    /// flagged multi-tenant. Every failure mode (unknown name, invalid
    /// input, handler error) comes back as a [`ToolError`] for the caller to
    /// feed into the conversation; nothing is raised past this boundary.
    pub async fn invoke(
        &self,
        name: &str,
        tenant: &TenantContext,
        input: Value,
    ) -> Result<Value, ToolError> {
        let spec = match self.resolve(name) {
            Ok(spec) => spec,
            Err(err) => return Err(err.into_tool_error()),
        };

        if let Err(err) = validate_input(&spec.input_schema, &input) {
            return Err(err.into_tool_error());
        }

        let tenant_id = spec.multi_tenant.then_some(tenant.tenant_id.as_str());
        spec.handler().execute(tenant_id, input).await
    }
}

/// Structural validation of a tool call input against the declared schema
///
/// Checks what the schema states: the input is an object when the schema
/// says so, required properties are present, and declared property types
/// agree. Anything deeper is the handler's business.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), MeshError> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !input.is_object() {
        return Err(MeshError::Validation("tool input must be an object".into()));
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if input.get(name).is_none() {
                return Err(MeshError::Validation(format!(
                    "missing required property '{name}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let Some(value) = input.get(name) else {
                continue;
            };
            let Some(expected) = prop_schema.get("type").and_then(Value::as_str) else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(MeshError::Validation(format!(
                    "property '{name}' must be of type {expected}"
                )));
            }
        }
    }

    Ok(())
}
