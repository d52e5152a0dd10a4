//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmError, ModelClient};
use crate::models::{ConversationMessage, ToolCall};
use crate::tools::{AgentTool, ToolDefinition, ToolError};

pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        message: ConversationMessage::assistant(text),
        finish_reason: FinishReason::Stop,
        model: "test-model".to_string(),
        usage: None,
    }
}

/// Response requesting `(id, tool, raw_arguments)` calls.
pub fn tool_call_response(calls: Vec<(&str, &str, &str)>) -> CompletionResponse {
    let calls = calls
        .into_iter()
        .map(|(id, name, args)| ToolCall::new(id, name, args))
        .collect();
    CompletionResponse {
        message: ConversationMessage::assistant_with_tool_calls("", calls),
        finish_reason: FinishReason::ToolCalls,
        model: "test-model".to_string(),
        usage: None,
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub had_tools: bool,
}

/// Model that replays a fixed script of responses in call order.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    repeat: Option<CompletionResponse>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Model that answers every call with the same response.
    pub fn repeating(response: CompletionResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::with_results(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            had_tools: request.tools.is_some(),
        });
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

fn object_tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({ "type": "object" }),
    }
}

pub struct PanickingTool;

#[async_trait]
impl AgentTool for PanickingTool {
    fn definition(&self) -> ToolDefinition {
        object_tool("panic_tool", "Panics when called")
    }

    async fn call(&self, _params: Value) -> Result<Value, ToolError> {
        panic!("tool blew up");
    }
}

pub struct FailingTool;

#[async_trait]
impl AgentTool for FailingTool {
    fn definition(&self) -> ToolDefinition {
        object_tool("failing_tool", "Always returns an error")
    }

    async fn call(&self, _params: Value) -> Result<Value, ToolError> {
        Err(ToolError::Failed("backend unavailable".to_string()))
    }
}

/// Completes only once every participant has reached the barrier.
pub struct BarrierTool {
    barrier: Arc<tokio::sync::Barrier>,
}

impl BarrierTool {
    pub fn new(barrier: Arc<tokio::sync::Barrier>) -> Self {
        Self { barrier }
    }
}

#[async_trait]
impl AgentTool for BarrierTool {
    fn definition(&self) -> ToolDefinition {
        object_tool("barrier", "Waits for its sibling calls")
    }

    async fn call(&self, _params: Value) -> Result<Value, ToolError> {
        self.barrier.wait().await;
        Ok(json!({ "released": true }))
    }
}
