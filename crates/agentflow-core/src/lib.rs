//! agentflow core: tool-calling agent turns and sequential multi-agent workflows.
//!
//! This crate contains the engine, its data models, the SQLite-backed stores
//! and the HTTP model adapters. It has no CLI or HTTP-server dependency,
//! making it suitable for use in:
//!
//! - the `agentflow` CLI (via `agentflow-cli`)
//! - services embedding the engine behind their own API
//! - tests driving the engine with scripted model clients

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod ratelimit;
pub mod store;
pub mod tools;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// Convenience re-exports
pub use agent::{TurnExecutor, TurnOptions, TurnResult};
pub use config::EngineConfig;
pub use db::Database;
pub use error::FlowError;
pub use workflow::{WorkflowDefinition, WorkflowExecutionResult, WorkflowSequencer};
