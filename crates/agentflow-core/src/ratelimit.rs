//! Per-user rate limiting, consulted by callers before starting a workflow run.
//!
//! The shipped limiter is `store::SqliteRateLimiter`, whose windows live in the
//! database so they hold across CLI invocations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::FlowError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Decision for the `count`-th request of a fixed window.
    pub fn for_count(count: u32, limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: count <= limit,
            remaining: limit.saturating_sub(count),
            reset_at,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check and record one `action` for `user_id`.
    async fn check(&self, user_id: &str, action: &str) -> Result<RateLimitDecision, FlowError>;
}
