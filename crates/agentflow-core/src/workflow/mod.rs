//! Workflow engine: YAML-defined sequential agent pipelines.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► WorkflowSequencer
//!                                              │
//!                          AgentLoader ───────►│ (agent config per step)
//!                                              │
//!                                         TurnExecutor ──► ModelClient / ToolRegistry
//!                                              │
//!                                           LogSink (runs, steps, tool calls)
//! ```

pub mod contracts;
pub mod schema;
pub mod sequencer;

pub use contracts::{AgentLoader, LogSink};
pub use schema::{TriggerConfig, WorkflowDefinition, WorkflowEdge, WorkflowStatus, WorkflowStep};
pub use sequencer::{AgentRunSummary, WorkflowExecutionResult, WorkflowSequencer};
