//! Anthropic Messages API adapter.
//!
//! POST {base_url}/v1/messages
//! Headers:
//!   x-api-key: {api_key}
//!   anthropic-version: 2023-06-01
//!   content-type: application/json

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{LlmError, ModelClient};
use super::types::{CompletionRequest, CompletionResponse, FinishReason, TokenUsage};
use super::{map_status_error, map_transport_error};
use crate::models::{ConversationMessage, MessageRole, ToolCall};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn build_body(request: &CompletionRequest<'_>) -> Value {
        let (system, messages) = to_anthropic_messages(request.messages);

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if let Some(system) = system {
            body["system"] = Value::String(system);
        }

        body["temperature"] = serde_json::Number::from_f64(request.temperature)
            .map(Value::Number)
            .unwrap_or_else(|| json!(0));

        if let Some(tools) = request.tools {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        body
    }

    fn parse_body(json: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let blocks = json
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LlmError::InvalidResponse("response has no content array".to_string()))?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        text_parts.push(text.to_string());
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
                _ => {}
            }
        }
        let content = text_parts.join("\n");

        let finish_reason = match json.get("stop_reason").and_then(|s| s.as_str()) {
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::MaxTokens,
            _ => FinishReason::Stop,
        };

        let usage = json.get("usage").map(|u| TokenUsage {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });

        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(fallback_model)
            .to_string();

        let message = if tool_calls.is_empty() {
            ConversationMessage::assistant(content)
        } else {
            ConversationMessage::assistant_with_tool_calls(content, tool_calls)
        };

        Ok(CompletionResponse {
            message,
            finish_reason,
            model,
            usage,
        })
    }
}

/// Split the transcript into Anthropic's `system` string and message list.
///
/// Tool results become `tool_result` blocks inside a user message, and runs of
/// consecutive tool results are merged into one user message so roles keep
/// alternating.
fn to_anthropic_messages(messages: &[ConversationMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut out: Vec<Value> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(&msg.content),
            MessageRole::User => out.push(json!({ "role": "user", "content": msg.content })),
            MessageRole::Assistant => {
                let calls = msg.requested_tool_calls();
                if calls.is_empty() {
                    out.push(json!({ "role": "assistant", "content": msg.content }));
                    continue;
                }
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": msg.content }));
                }
                for call in calls {
                    // The model already saw its own malformed arguments; replay them as an empty object.
                    let input: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": input,
                    }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            MessageRole::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                });
                let merged = out.last_mut().and_then(|last| {
                    let is_tool_results = last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .map(|blocks| blocks.iter().all(|b| b["type"] == "tool_result"))
                            .unwrap_or(false);
                    if is_tool_results {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => out.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, out)
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(request);

        tracing::debug!(
            model = %request.model,
            message_count = request.messages.len(),
            has_tools = request.tools.is_some(),
            "[Anthropic] Sending messages request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Connection(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(map_status_error(status, response_text));
        }

        let json: Value = serde_json::from_str(&response_text)
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response JSON: {}", e)))?;

        Self::parse_body(&json, request.model)
    }
}
