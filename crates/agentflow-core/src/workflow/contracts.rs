//! Narrow interfaces the sequencer consumes: where agents come from and
//! where run records go.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::FlowError;
use crate::models::{AgentConfig, AgentRun, ToolInvocation, WorkflowRun};

/// Resolves an agent id to its configuration.
#[async_trait]
pub trait AgentLoader: Send + Sync {
    /// `FlowError::NotFound` when no agent has this id.
    async fn load_agent(&self, agent_id: &str) -> Result<AgentConfig, FlowError>;
}

/// Append-only sink for run records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn create_workflow_run(&self, run: &WorkflowRun) -> Result<(), FlowError>;

    async fn update_workflow_run(&self, run: &WorkflowRun) -> Result<(), FlowError>;

    async fn create_agent_run(&self, run: &AgentRun) -> Result<(), FlowError>;

    async fn update_agent_run(&self, run: &AgentRun) -> Result<(), FlowError>;

    async fn create_tool_invocation(&self, invocation: &ToolInvocation) -> Result<(), FlowError>;
}

/// Fixed set of agents keyed by id.
#[async_trait]
impl AgentLoader for HashMap<String, AgentConfig> {
    async fn load_agent(&self, agent_id: &str) -> Result<AgentConfig, FlowError> {
        self.get(agent_id)
            .cloned()
            .ok_or_else(|| FlowError::NotFound(format!("Agent '{}'", agent_id)))
    }
}
