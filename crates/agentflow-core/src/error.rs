//! Core error type for the agentflow engine.
//!
//! `FlowError` is used throughout the core domain (stores, sequencer,
//! loaders). A failing tool call is described by `ToolExecution`, but that
//! error is rendered into the call's `ToolResult` and never propagated.

use crate::llm::LlmError;
use crate::tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Workflow cannot be run (inactive, no steps). Raised before any run record exists.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("No final answer after {0} iterations")]
    IterationExhausted(u32),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LlmError> for FlowError {
    fn from(err: LlmError) -> Self {
        FlowError::ModelInvocation(err.to_string())
    }
}

impl From<ToolError> for FlowError {
    fn from(err: ToolError) -> Self {
        FlowError::ToolExecution(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_maps_to_model_invocation() {
        let err: FlowError = LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }
        .into();
        assert!(matches!(err, FlowError::ModelInvocation(_)));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_tool_error_maps_to_tool_execution() {
        let err: FlowError = ToolError::Failed("disk full".to_string()).into();
        assert_eq!(err.to_string(), "Tool execution failed: disk full");
    }

    #[test]
    fn test_iteration_exhausted_message() {
        let err = FlowError::IterationExhausted(10);
        assert_eq!(err.to_string(), "No final answer after 10 iterations");
    }
}
