use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Lifecycle shared by workflow runs and agent runs:
/// `pending → running → {completed, failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Failing straight from `pending` is allowed so a run that breaks
    /// before it starts can still be closed out.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

fn check_transition(kind: &str, id: &str, from: RunStatus, to: RunStatus) -> Result<(), FlowError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(FlowError::Internal(format!(
            "{} {} cannot move from {} to {}",
            kind,
            id,
            from.as_str(),
            to.as_str()
        )))
    }
}

/// One execution attempt of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub user_id: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(workflow_id: impl Into<String>, user_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            user_id: user_id.into(),
            input: input.into(),
            output: None,
            error: None,
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) -> Result<(), FlowError> {
        check_transition("Workflow run", &self.id, self.status, RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output: String) -> Result<(), FlowError> {
        check_transition("Workflow run", &self.id, self.status, RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, output: Option<String>, error: String) -> Result<(), FlowError> {
        check_transition("Workflow run", &self.id, self.status, RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.output = output;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// One step attempt within a workflow run. Never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRun {
    pub id: String,
    pub workflow_run_id: String,
    pub agent_id: String,
    pub step_order: u32,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentRun {
    pub fn new(
        workflow_run_id: impl Into<String>,
        agent_id: impl Into<String>,
        step_order: u32,
        input: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_run_id: workflow_run_id.into(),
            agent_id: agent_id.into(),
            step_order,
            input: input.into(),
            output: None,
            error: None,
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) -> Result<(), FlowError> {
        check_transition("Agent run", &self.id, self.status, RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output: String) -> Result<(), FlowError> {
        check_transition("Agent run", &self.id, self.status, RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: String) -> Result<(), FlowError> {
        check_transition("Agent run", &self.id, self.status, RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// A persisted tool call, written after the owning turn finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub agent_run_id: String,
    pub tool: String,
    pub params: serde_json::Value,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}
