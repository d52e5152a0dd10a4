pub mod agent_store;
pub mod rate_limit_store;
pub mod run_store;

pub use agent_store::AgentStore;
pub use rate_limit_store::SqliteRateLimiter;
pub use run_store::RunStore;
