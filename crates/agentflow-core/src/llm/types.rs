use serde::{Deserialize, Serialize};

use crate::models::ConversationMessage;
use crate::tools::ToolDefinition;

/// Everything a model round-trip needs.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ConversationMessage],
    /// `None` means the tool parameter is omitted from the wire request entirely.
    pub tools: Option<&'a [ToolDefinition]>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    MaxTokens,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The assistant message returned by a round-trip.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: ConversationMessage,
    pub finish_reason: FinishReason,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.message.requested_tool_calls().is_empty()
    }
}
