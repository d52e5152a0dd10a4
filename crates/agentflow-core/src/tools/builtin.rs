use async_trait::async_trait;
use serde_json::{json, Value};

use super::registry::{AgentTool, ToolError};
use super::ToolDefinition;

/// Returns the current UTC time.
pub struct CurrentTimeTool;

#[async_trait]
impl AgentTool for CurrentTimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "current_time".to_string(),
            description: "Get the current UTC date and time.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "enum": ["rfc3339", "unix"],
                        "description": "Output format (default: rfc3339)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }

    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        let now = chrono::Utc::now();
        match params.get("format").and_then(|f| f.as_str()).unwrap_or("rfc3339") {
            "unix" => Ok(json!({ "now": now.timestamp() })),
            _ => Ok(json!({ "now": now.to_rfc3339() })),
        }
    }
}

/// Returns its input. Handy for wiring checks.
pub struct EchoTool;

#[async_trait]
impl AgentTool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echo back the given text.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            }),
        }
    }

    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        let text = params
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ToolError::InvalidParams("text is required".to_string()))?;
        Ok(json!({ "text": text }))
    }
}
