//! Tool registry contracts and the in-process registry.
//!
//! Tools are capabilities an agent can call during a turn. The registry
//! resolves a tool id to its implementation and JSON-schema descriptor, and
//! validates parameters against that schema before dispatch.
//!
//! Built-in tools:
//!   1. current_time - Current UTC time (rfc3339 or unix seconds)
//!   2. echo         - Returns its `text` parameter

mod builtin;
mod registry;

use serde::{Deserialize, Serialize};

pub use builtin::{CurrentTimeTool, EchoTool};
pub use registry::{AgentTool, LocalToolRegistry, ToolError, ToolRegistry};

/// JSON-schema descriptor advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the parameters object.
    pub parameters: serde_json::Value,
}

/// Result of a tool operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn success(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or_default()),
            error: None,
            execution_time_ms: 0,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            execution_time_ms: 0,
        }
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}

/// Tool arguments after decoding the wire string.
///
/// A malformed payload is a value, not an error: it becomes a failed tool
/// record the model can react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Parsed(serde_json::Value),
    Malformed { raw: String, error: String },
}

impl ToolArguments {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return ToolArguments::Parsed(serde_json::json!({}));
        }
        match serde_json::from_str(raw) {
            Ok(value) => ToolArguments::Parsed(value),
            Err(e) => ToolArguments::Malformed {
                raw: raw.to_string(),
                error: e.to_string(),
            },
        }
    }

    /// Value recorded as the invocation's params.
    pub fn as_recorded(&self) -> serde_json::Value {
        match self {
            ToolArguments::Parsed(value) => value.clone(),
            ToolArguments::Malformed { raw, .. } => serde_json::Value::String(raw.clone()),
        }
    }
}
