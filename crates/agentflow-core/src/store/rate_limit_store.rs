use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::FlowError;
use crate::ratelimit::{RateLimitDecision, RateLimiter};

/// Fixed-window limiter keyed by `(user_id, action)`, persisted in `rate_limits`.
#[derive(Clone)]
pub struct SqliteRateLimiter {
    db: Database,
    limit: u32,
    window: Duration,
}

impl SqliteRateLimiter {
    pub fn new(db: Database, limit: u32, window: Duration) -> Self {
        Self { db, limit, window }
    }
}

#[async_trait]
impl RateLimiter for SqliteRateLimiter {
    async fn check(&self, user_id: &str, action: &str) -> Result<RateLimitDecision, FlowError> {
        let user = user_id.to_string();
        let act = action.to_string();
        let now = Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;
        // Blocked attempts stop counting one past the limit.
        let cap = i64::from(self.limit) + 1;

        let (window_start, count) = self
            .db
            .with_conn_async(move |conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute(
                    "DELETE FROM rate_limits WHERE window_start <= ?1",
                    rusqlite::params![now - window_ms],
                )?;
                let row = tx.query_row(
                    "INSERT INTO rate_limits (user_id, action, window_start, count)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT (user_id, action) DO UPDATE SET count = MIN(count + 1, ?4)
                     RETURNING window_start, count",
                    rusqlite::params![user, act, now, cap],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        let reset_at = DateTime::from_timestamp_millis(window_start + window_ms).unwrap_or_else(Utc::now);
        let decision = RateLimitDecision::for_count(count as u32, self.limit, reset_at);
        if !decision.allowed {
            tracing::debug!(user_id, action, "[RateLimiter] Limit reached");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window: Duration) -> SqliteRateLimiter {
        SqliteRateLimiter::new(Database::open_in_memory().unwrap(), limit, window)
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_blocks() {
        let limiter = limiter(3, Duration::from_secs(60));
        let mut remaining = Vec::new();
        for _ in 0..3 {
            remaining.push(limiter.check("u1", "workflow.run").await.unwrap().remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let blocked = limiter.check("u1", "workflow.run").await.unwrap();
        assert!(!blocked.allowed);
        assert!(blocked.reset_at > Utc::now());
    }

    #[tokio::test]
    async fn test_users_and_actions_have_separate_windows() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("u1", "workflow.run").await.unwrap().allowed);
        assert!(!limiter.check("u1", "workflow.run").await.unwrap().allowed);
        assert!(limiter.check("u2", "workflow.run").await.unwrap().allowed);
        assert!(limiter.check("u1", "agent.import").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let limiter = limiter(1, Duration::from_millis(20));
        assert!(limiter.check("u1", "run").await.unwrap().allowed);
        assert!(!limiter.check("u1", "run").await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check("u1", "run").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_expired_windows_are_pruned() {
        let limiter = limiter(5, Duration::from_millis(20));
        limiter.check("stale", "run").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.check("fresh", "run").await.unwrap();

        let users: Vec<String> = limiter
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT user_id FROM rate_limits")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap();
        assert_eq!(users, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_window_survives_a_new_handle_on_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.db");
        let path = path.to_str().unwrap();

        let first = SqliteRateLimiter::new(Database::open(path).unwrap(), 1, Duration::from_secs(3600));
        assert!(first.check("u1", "workflow.run").await.unwrap().allowed);
        drop(first);

        let second = SqliteRateLimiter::new(Database::open(path).unwrap(), 1, Duration::from_secs(3600));
        assert!(!second.check("u1", "workflow.run").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_zero_limit_blocks_everything() {
        let limiter = limiter(0, Duration::from_secs(60));
        assert!(!limiter.check("u1", "run").await.unwrap().allowed);
    }
}
