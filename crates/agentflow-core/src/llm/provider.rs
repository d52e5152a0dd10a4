//! Model client trait definition.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{CompletionRequest, CompletionResponse};

/// Errors that can occur when talking to a model endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,
}

/// Trait for model backends.
///
/// One call is one round-trip: the full transcript goes out, one assistant
/// message (plain text or tool calls) comes back.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Adapter name (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, LlmError>;
}
