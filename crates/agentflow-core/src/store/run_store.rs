use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::FlowError;
use crate::models::{AgentRun, RunStatus, ToolInvocation, WorkflowRun};
use crate::workflow::LogSink;

/// SQLite-backed run log: workflow runs, agent runs and tool invocations.
#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_workflow_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, FlowError> {
        let id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, user_id, input, output, error, status, started_at, finished_at
                     FROM workflow_runs WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_workflow_run(row)))
                    .optional()
            })
            .await
    }

    /// Runs of one workflow, newest first.
    pub async fn list_workflow_runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, FlowError> {
        let wf_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, user_id, input, output, error, status, started_at, finished_at
                     FROM workflow_runs WHERE workflow_id = ?1 ORDER BY started_at DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![wf_id], |row| Ok(row_to_workflow_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Agent runs of one workflow run, in step order.
    pub async fn list_agent_runs(&self, workflow_run_id: &str) -> Result<Vec<AgentRun>, FlowError> {
        let run_id = workflow_run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_run_id, agent_id, step_order, input, output, error, status, started_at, finished_at
                     FROM agent_runs WHERE workflow_run_id = ?1 ORDER BY step_order ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_agent_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_tool_invocations(&self, agent_run_id: &str) -> Result<Vec<ToolInvocation>, FlowError> {
        let run_id = agent_run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_run_id, tool, params, status, result, error, started_at, finished_at, execution_time_ms
                     FROM tool_invocations WHERE agent_run_id = ?1 ORDER BY started_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_tool_invocation(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

#[async_trait]
impl LogSink for RunStore {
    async fn create_workflow_run(&self, run: &WorkflowRun) -> Result<(), FlowError> {
        let r = run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_runs (id, workflow_id, user_id, input, output, error, status, started_at, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        r.id,
                        r.workflow_id,
                        r.user_id,
                        r.input,
                        r.output,
                        r.error,
                        r.status.as_str(),
                        r.started_at.map(|t| t.timestamp_millis()),
                        r.finished_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn update_workflow_run(&self, run: &WorkflowRun) -> Result<(), FlowError> {
        let r = run.clone();
        let updated = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflow_runs SET output = ?1, error = ?2, status = ?3, started_at = ?4, finished_at = ?5
                     WHERE id = ?6",
                    rusqlite::params![
                        r.output,
                        r.error,
                        r.status.as_str(),
                        r.started_at.map(|t| t.timestamp_millis()),
                        r.finished_at.map(|t| t.timestamp_millis()),
                        r.id,
                    ],
                )
            })
            .await?;
        if updated == 0 {
            return Err(FlowError::NotFound(format!("Workflow run '{}'", run.id)));
        }
        Ok(())
    }

    async fn create_agent_run(&self, run: &AgentRun) -> Result<(), FlowError> {
        let r = run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO agent_runs (id, workflow_run_id, agent_id, step_order, input, output, error, status, started_at, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        r.id,
                        r.workflow_run_id,
                        r.agent_id,
                        r.step_order,
                        r.input,
                        r.output,
                        r.error,
                        r.status.as_str(),
                        r.started_at.map(|t| t.timestamp_millis()),
                        r.finished_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn update_agent_run(&self, run: &AgentRun) -> Result<(), FlowError> {
        let r = run.clone();
        let updated = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE agent_runs SET output = ?1, error = ?2, status = ?3, started_at = ?4, finished_at = ?5
                     WHERE id = ?6",
                    rusqlite::params![
                        r.output,
                        r.error,
                        r.status.as_str(),
                        r.started_at.map(|t| t.timestamp_millis()),
                        r.finished_at.map(|t| t.timestamp_millis()),
                        r.id,
                    ],
                )
            })
            .await?;
        if updated == 0 {
            return Err(FlowError::NotFound(format!("Agent run '{}'", run.id)));
        }
        Ok(())
    }

    async fn create_tool_invocation(&self, invocation: &ToolInvocation) -> Result<(), FlowError> {
        let t = invocation.clone();
        let params = serde_json::to_string(&t.params)?;
        let result = t.result.as_ref().map(serde_json::to_string).transpose()?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO tool_invocations (id, agent_run_id, tool, params, status, result, error, started_at, finished_at, execution_time_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        t.id,
                        t.agent_run_id,
                        t.tool,
                        params,
                        t.status.as_str(),
                        result,
                        t.error,
                        t.started_at.timestamp_millis(),
                        t.finished_at.timestamp_millis(),
                        t.execution_time_ms as i64,
                    ],
                )?;
                Ok(())
            })
            .await
    }
}

fn millis_to_datetime(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn parse_status(row: &Row<'_>, idx: usize) -> RunStatus {
    RunStatus::from_str(&row.get::<_, String>(idx).unwrap_or_default()).unwrap_or(RunStatus::Pending)
}

fn row_to_workflow_run(row: &Row<'_>) -> WorkflowRun {
    WorkflowRun {
        id: row.get(0).unwrap_or_default(),
        workflow_id: row.get(1).unwrap_or_default(),
        user_id: row.get(2).unwrap_or_default(),
        input: row.get(3).unwrap_or_default(),
        output: row.get(4).unwrap_or(None),
        error: row.get(5).unwrap_or(None),
        status: parse_status(row, 6),
        started_at: millis_to_datetime(row.get(7).unwrap_or(None)),
        finished_at: millis_to_datetime(row.get(8).unwrap_or(None)),
    }
}

fn row_to_agent_run(row: &Row<'_>) -> AgentRun {
    AgentRun {
        id: row.get(0).unwrap_or_default(),
        workflow_run_id: row.get(1).unwrap_or_default(),
        agent_id: row.get(2).unwrap_or_default(),
        step_order: row.get(3).unwrap_or(0),
        input: row.get(4).unwrap_or_default(),
        output: row.get(5).unwrap_or(None),
        error: row.get(6).unwrap_or(None),
        status: parse_status(row, 7),
        started_at: millis_to_datetime(row.get(8).unwrap_or(None)),
        finished_at: millis_to_datetime(row.get(9).unwrap_or(None)),
    }
}

fn row_to_tool_invocation(row: &Row<'_>) -> ToolInvocation {
    let params_str: String = row.get(3).unwrap_or_default();
    let result_str: Option<String> = row.get(5).unwrap_or(None);
    let started_ms: i64 = row.get(7).unwrap_or(0);
    let finished_ms: i64 = row.get(8).unwrap_or(0);
    let execution_ms: i64 = row.get(9).unwrap_or(0);

    ToolInvocation {
        id: row.get(0).unwrap_or_default(),
        agent_run_id: row.get(1).unwrap_or_default(),
        tool: row.get(2).unwrap_or_default(),
        params: serde_json::from_str(&params_str).unwrap_or(serde_json::Value::Null),
        status: parse_status(row, 4),
        result: result_str.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get(6).unwrap_or(None),
        started_at: DateTime::from_timestamp_millis(started_ms).unwrap_or_else(Utc::now),
        finished_at: DateTime::from_timestamp_millis(finished_ms).unwrap_or_else(Utc::now),
        execution_time_ms: execution_ms.max(0) as u64,
    }
}
