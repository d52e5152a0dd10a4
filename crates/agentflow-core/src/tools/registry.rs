use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::{ToolDefinition, ToolResult};
use crate::error::FlowError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool not available: {0}")]
    NotAvailable(String),

    #[error("{0}")]
    Failed(String),
}

/// A single invocable capability.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run with parameters that already passed schema validation.
    async fn call(&self, params: Value) -> Result<Value, ToolError>;
}

/// Resolves tool ids to capabilities.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Schema descriptors for the given enabled ids, in the order given.
    /// Unknown ids are skipped.
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition>;

    /// Invoke a tool. Never fails: every problem is reported in the result.
    async fn invoke(&self, tool_id: &str, params: Value) -> ToolResult;
}

/// In-process registry with JSON-schema validation before dispatch.
#[derive(Clone, Default)]
pub struct LocalToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::CurrentTimeTool));
        registry.register(Arc::new(super::EchoTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("[ToolRegistry] Replaced existing tool '{}'", name);
        }
    }

    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }
}

/// Validate `params` against a JSON schema, collecting every violation.
pub(crate) fn validate_params(schema: &Value, params: &Value) -> Result<(), ToolError> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| ToolError::Failed(format!("tool schema is invalid: {}", e)))?;
    let result = compiled.validate(params).map_err(|errors| {
        ToolError::InvalidParams(errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; "))
    });
    result
}

#[async_trait]
impl ToolRegistry for LocalToolRegistry {
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition> {
        enabled
            .iter()
            .filter_map(|id| self.tools.get(id).map(|t| t.definition()))
            .collect()
    }

    async fn invoke(&self, tool_id: &str, params: Value) -> ToolResult {
        let started = Instant::now();
        let Some(tool) = self.tools.get(tool_id) else {
            return ToolResult::error(ToolError::NotAvailable(tool_id.to_string()).to_string());
        };

        let definition = tool.definition();
        if let Err(e) = validate_params(&definition.parameters, &params) {
            tracing::debug!("[ToolRegistry] Rejected params for '{}': {}", tool_id, e);
            return ToolResult::error(e.to_string())
                .with_execution_time(started.elapsed().as_millis() as u64);
        }

        let result = match tool.call(params).await {
            Ok(data) => ToolResult::success(data),
            Err(e) => ToolResult::error(FlowError::from(e).to_string()),
        };
        result.with_execution_time(started.elapsed().as_millis() as u64)
    }
}
