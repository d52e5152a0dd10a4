//! YAML schema types for workflow definitions.
//!
//! A workflow YAML declares an ordered chain of agent-backed steps:
//!
//! ```yaml
//! id: research-digest
//! name: "Research digest"
//! status: active      # active | inactive | draft
//!
//! trigger:
//!   type: manual      # manual | webhook | schedule
//!
//! steps:
//!   - id: gather
//!     agent_id: researcher
//!     name: "Gather"
//!   - id: write
//!     agent_id: writer
//!     name: "Write"
//!
//! edges:
//!   - { from: gather, to: write }
//! ```
//!
//! Steps run in declared order. Edges are informational only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Top-level workflow definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub status: WorkflowStatus,

    /// How the workflow is triggered
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Ordered list of workflow steps
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Inactive,
    Draft,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Draft => "draft",
        }
    }
}

/// Trigger configuration: how/when the workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Trigger type: "manual", "webhook", "schedule"
    #[serde(rename = "type", default = "default_trigger_type")]
    pub trigger_type: String,

    /// For webhook triggers: the event source (e.g., "github")
    #[serde(default)]
    pub source: Option<String>,

    /// For webhook triggers: the event name (e.g., "issues.opened")
    #[serde(default)]
    pub event: Option<String>,

    /// For schedule triggers: cron expression
    #[serde(default)]
    pub cron: Option<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            trigger_type: default_trigger_type(),
            source: None,
            event: None,
            cron: None,
        }
    }
}

fn default_trigger_type() -> String {
    "manual".to_string()
}

/// A single step in the workflow pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id (unique within the workflow, referenced by edges)
    pub id: String,

    /// Agent to run for this step
    pub agent_id: String,

    #[serde(default)]
    pub name: String,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            name: name.into(),
        }
    }

    /// Name used in logs and error messages; falls back to the step id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

impl WorkflowDefinition {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse workflow YAML: {}", e))
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read workflow file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Preconditions for execution: the workflow is active and declares at least one step.
    pub fn ensure_runnable(&self) -> Result<(), FlowError> {
        if self.status != WorkflowStatus::Active {
            return Err(FlowError::Validation(format!(
                "Workflow '{}' is not active (status: {})",
                self.id,
                self.status.as_str()
            )));
        }
        if self.steps.is_empty() {
            return Err(FlowError::Validation(format!("Workflow '{}' has no steps", self.id)));
        }
        Ok(())
    }

    /// Execution order. Always the declared array order; edges never reorder steps.
    pub fn ordered_steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Non-fatal problems: duplicate step ids and edges naming unknown steps.
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                warnings.push(format!("Duplicate step id '{}'", step.id));
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !seen.contains(end.as_str()) {
                    warnings.push(format!(
                        "Edge {} -> {} references unknown step '{}'",
                        edge.from, edge.to, end
                    ));
                }
            }
        }
        warnings
    }
}
