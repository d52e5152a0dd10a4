//! Model invocation layer.
//!
//! A `ModelClient` is an explicit value handed to the turn executor; there is
//! no process-wide client cache. Two HTTP adapters are provided:
//!
//! - `openai`: OpenAI-compatible `/chat/completions` (also GLM, vLLM, Ollama's compat API)
//! - `anthropic`: Anthropic Messages API `/v1/messages`

mod anthropic;
mod openai;
mod provider;
mod types;

use std::sync::Arc;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;
pub use provider::{LlmError, ModelClient};
pub use types::{CompletionRequest, CompletionResponse, FinishReason, TokenUsage};

use crate::config::{EngineConfig, ModelAdapter};

/// Build the model client selected by the engine configuration.
pub fn build_model_client(config: &EngineConfig) -> Arc<dyn ModelClient> {
    match config.adapter {
        ModelAdapter::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            &config.base_url,
            &config.api_key,
            config.request_timeout,
        )),
        ModelAdapter::Anthropic => Arc::new(AnthropicClient::new(
            &config.base_url,
            &config.api_key,
            config.request_timeout,
        )),
    }
}

/// Shared reqwest error mapping for the HTTP adapters.
pub(crate) fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connection(e.to_string())
    }
}

/// Turn a non-success HTTP status into an `LlmError`.
pub(crate) fn map_status_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status.as_u16() == 429 {
        LlmError::RateLimited
    } else {
        LlmError::Api {
            status: status.as_u16(),
            message: body,
        }
    }
}
