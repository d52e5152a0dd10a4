//! Workflow Sequencer: runs a workflow's steps in order, one agent turn per step.
//!
//! The sequencer:
//! 1. Checks the workflow is runnable (before any record exists)
//! 2. Creates the WorkflowRun and marks it running
//! 3. For each step: loads the agent, records an AgentRun, runs one turn,
//!    persists the turn's tool calls, feeds the output to the next step
//! 4. Stops at the first failing step
//! 5. Finalizes the WorkflowRun with the last output or the failing step's error

use std::time::Instant;

use serde::Serialize;

use crate::agent::{ToolExecution, TurnExecutor};
use crate::error::FlowError;
use crate::models::{AgentConfig, AgentRun, RunStatus, ToolInvocation, WorkflowRun};
use crate::workflow::contracts::{AgentLoader, LogSink};
use crate::workflow::schema::{WorkflowDefinition, WorkflowStep};

/// Outcome of a single step, as reported to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunSummary {
    pub agent_run_id: String,
    pub step_id: String,
    pub step_order: u32,
    pub agent_id: String,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_calls: Vec<ToolExecution>,
    pub execution_time_ms: u64,
}

/// Result of executing the entire workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub success: bool,
    pub workflow_run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub agent_runs: Vec<AgentRunSummary>,
    pub total_execution_time_ms: u64,
}

enum RunOutcome {
    Completed(String),
    /// The sink rejected the run record; nothing further was written.
    Unrecorded(String),
    StepFailed {
        last_output: Option<String>,
        error: String,
    },
}

pub struct WorkflowSequencer {
    executor: TurnExecutor,
}

impl WorkflowSequencer {
    pub fn new(executor: TurnExecutor) -> Self {
        Self { executor }
    }

    /// Execute a workflow against an initial input.
    ///
    /// `Err` is returned only when the workflow is not runnable, before any
    /// record is written. Every later failure, including a log sink that
    /// rejects the run record itself, is reported through the returned result.
    pub async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        input: &str,
        user_id: &str,
        agent_loader: &dyn AgentLoader,
        log_sink: &dyn LogSink,
    ) -> Result<WorkflowExecutionResult, FlowError> {
        workflow.ensure_runnable()?;
        for warning in workflow.lint() {
            tracing::warn!(workflow_id = %workflow.id, "[Sequencer] {}", warning);
        }

        let started = Instant::now();
        let mut run = WorkflowRun::new(&workflow.id, user_id, input);

        tracing::info!(
            workflow_id = %workflow.id,
            workflow_run_id = %run.id,
            user_id = %user_id,
            steps = workflow.steps.len(),
            "[Sequencer] Starting workflow '{}'",
            workflow.display_name()
        );

        let mut agent_runs = Vec::with_capacity(workflow.steps.len());
        let created = log_sink.create_workflow_run(&run).await;
        let outcome = match created {
            Ok(()) => self.drive(workflow, input, &mut run, agent_loader, log_sink, &mut agent_runs).await,
            Err(e) => {
                tracing::error!(workflow_run_id = %run.id, "[Sequencer] Could not record workflow run: {}", e);
                Ok(RunOutcome::Unrecorded(e.to_string()))
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    workflow_run_id = %run.id,
                    "[Sequencer] Workflow run aborted: {}",
                    e
                );
                RunOutcome::StepFailed {
                    last_output: agent_runs.iter().rev().find(|r| r.success).map(|r| r.output.clone()),
                    error: e.to_string(),
                }
            }
        };

        let (success, output, error) = match outcome {
            RunOutcome::Completed(output) => {
                match self.finalize(&mut run, log_sink, Ok(output.clone())).await {
                    Ok(()) => (true, Some(output), None),
                    Err(e) => {
                        tracing::error!(workflow_run_id = %run.id, "[Sequencer] Failed to finalize run: {}", e);
                        (false, Some(output), Some(e.to_string()))
                    }
                }
            }
            RunOutcome::StepFailed { last_output, error } => {
                if let Err(e) = self
                    .finalize(&mut run, log_sink, Err((last_output.clone(), error.clone())))
                    .await
                {
                    tracing::error!(workflow_run_id = %run.id, "[Sequencer] Failed to finalize run: {}", e);
                }
                (false, last_output, Some(error))
            }
            RunOutcome::Unrecorded(error) => (false, None, Some(error)),
        };

        let total_execution_time_ms = started.elapsed().as_millis() as u64;
        if success {
            tracing::info!(
                workflow_run_id = %run.id,
                elapsed_ms = total_execution_time_ms,
                "[Sequencer] Workflow completed"
            );
        } else {
            tracing::warn!(
                workflow_run_id = %run.id,
                elapsed_ms = total_execution_time_ms,
                "[Sequencer] Workflow failed: {}",
                error.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(WorkflowExecutionResult {
            success,
            workflow_run_id: run.id.clone(),
            output,
            error,
            agent_runs,
            total_execution_time_ms,
        })
    }

    /// Run every step. Storage errors propagate with `?`; step failures end the run normally.
    async fn drive(
        &self,
        workflow: &WorkflowDefinition,
        input: &str,
        run: &mut WorkflowRun,
        agent_loader: &dyn AgentLoader,
        log_sink: &dyn LogSink,
        agent_runs: &mut Vec<AgentRunSummary>,
    ) -> Result<RunOutcome, FlowError> {
        run.mark_running()?;
        log_sink.update_workflow_run(run).await?;

        let steps = workflow.ordered_steps();
        let mut current_input = input.to_string();
        let mut last_output: Option<String> = None;

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(
                workflow_run_id = %run.id,
                step_id = %step.id,
                agent_id = %step.agent_id,
                "[Sequencer] Step {}/{}: {}",
                index + 1,
                steps.len(),
                step.display_name()
            );

            let agent = match agent_loader.load_agent(&step.agent_id).await {
                Ok(agent) => agent,
                Err(e) => {
                    return Ok(RunOutcome::StepFailed {
                        last_output,
                        error: step_error(index, step, &e.to_string()),
                    });
                }
            };

            let summary = self
                .run_step(run, index, step, &agent, &current_input, log_sink)
                .await?;
            let failure = (!summary.success).then(|| {
                step_error(index, step, summary.error.as_deref().unwrap_or("unknown error"))
            });
            let output = summary.output.clone();
            agent_runs.push(summary);

            if let Some(error) = failure {
                return Ok(RunOutcome::StepFailed { last_output, error });
            }
            last_output = Some(output.clone());
            current_input = output;
        }

        Ok(RunOutcome::Completed(current_input))
    }

    async fn run_step(
        &self,
        run: &WorkflowRun,
        index: usize,
        step: &WorkflowStep,
        agent: &AgentConfig,
        input: &str,
        log_sink: &dyn LogSink,
    ) -> Result<AgentRunSummary, FlowError> {
        let started = Instant::now();
        let mut agent_run = AgentRun::new(&run.id, &agent.id, index as u32, input);
        log_sink.create_agent_run(&agent_run).await?;
        agent_run.mark_running()?;
        log_sink.update_agent_run(&agent_run).await?;

        let turn = self.executor.execute(agent, input, &[]).await;
        tracing::debug!(
            agent_run_id = %agent_run.id,
            iterations = turn.iterations,
            tool_calls = turn.tool_calls.len(),
            input_tokens = turn.usage.input_tokens,
            output_tokens = turn.usage.output_tokens,
            "[Sequencer] Turn finished"
        );

        for execution in &turn.tool_calls {
            log_sink
                .create_tool_invocation(&to_invocation(&agent_run.id, execution))
                .await?;
        }

        if turn.success {
            agent_run.complete(turn.message.clone())?;
        } else {
            agent_run.fail(turn.error.clone().unwrap_or_else(|| "unknown error".to_string()))?;
        }
        log_sink.update_agent_run(&agent_run).await?;

        Ok(AgentRunSummary {
            agent_run_id: agent_run.id,
            step_id: step.id.clone(),
            step_order: agent_run.step_order,
            agent_id: agent.id.clone(),
            success: turn.success,
            output: turn.message,
            error: turn.error,
            tool_calls: turn.tool_calls,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn finalize(
        &self,
        run: &mut WorkflowRun,
        log_sink: &dyn LogSink,
        outcome: Result<String, (Option<String>, String)>,
    ) -> Result<(), FlowError> {
        match outcome {
            Ok(output) => run.complete(output)?,
            Err((output, error)) => {
                if !run.status.is_terminal() {
                    run.fail(output, error)?;
                }
            }
        }
        log_sink.update_workflow_run(run).await
    }
}

fn step_error(index: usize, step: &WorkflowStep, cause: &str) -> String {
    format!("Step {} ({}) failed: {}", index + 1, step.display_name(), cause)
}

fn to_invocation(agent_run_id: &str, execution: &ToolExecution) -> ToolInvocation {
    ToolInvocation {
        id: uuid::Uuid::new_v4().to_string(),
        agent_run_id: agent_run_id.to_string(),
        tool: execution.call.name.clone(),
        params: execution.params.clone(),
        status: if execution.result.success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        },
        result: execution.result.data.clone(),
        error: execution.result.error.clone(),
        started_at: execution.started_at,
        finished_at: execution.finished_at,
        execution_time_ms: execution.execution_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::db::Database;
    use crate::store::RunStore;
    use crate::test_support::{text_response, tool_call_response, ScriptedModel};
    use crate::tools::LocalToolRegistry;
    use crate::workflow::schema::WorkflowStatus;

    fn workflow(steps: &[(&str, &str)]) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-test".to_string(),
            name: "Test workflow".to_string(),
            description: None,
            status: WorkflowStatus::Active,
            trigger: Default::default(),
            steps: steps
                .iter()
                .map(|(id, agent)| WorkflowStep::new(*id, *agent, id.to_uppercase()))
                .collect(),
            edges: Vec::new(),
        }
    }

    fn agents(list: Vec<AgentConfig>) -> HashMap<String, AgentConfig> {
        list.into_iter().map(|a| (a.id.clone(), a)).collect()
    }

    fn sequencer(model: Arc<ScriptedModel>) -> WorkflowSequencer {
        WorkflowSequencer::new(TurnExecutor::new(model, Arc::new(LocalToolRegistry::with_builtins())))
    }

    fn run_store() -> RunStore {
        RunStore::new(Database::open_in_memory().unwrap())
    }

    /// Sink whose storage rejects every write.
    struct UnwritableSink;

    #[async_trait::async_trait]
    impl LogSink for UnwritableSink {
        async fn create_workflow_run(&self, _run: &WorkflowRun) -> Result<(), FlowError> {
            Err(FlowError::Database("disk full".to_string()))
        }

        async fn update_workflow_run(&self, _run: &WorkflowRun) -> Result<(), FlowError> {
            Err(FlowError::Database("disk full".to_string()))
        }

        async fn create_agent_run(&self, _run: &AgentRun) -> Result<(), FlowError> {
            Err(FlowError::Database("disk full".to_string()))
        }

        async fn update_agent_run(&self, _run: &AgentRun) -> Result<(), FlowError> {
            Err(FlowError::Database("disk full".to_string()))
        }

        async fn create_tool_invocation(&self, _invocation: &ToolInvocation) -> Result<(), FlowError> {
            Err(FlowError::Database("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_single_step_plain_answer() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("Summary ready")]));
        let store = run_store();
        let loader = agents(vec![AgentConfig::new("writer", "You write.", "m")]);

        let result = sequencer(model.clone())
            .execute_workflow(&workflow(&[("write", "writer")]), "topic", "user-1", &loader, &store)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("Summary ready"));
        assert_eq!(result.agent_runs.len(), 1);
        assert!(result.agent_runs[0].tool_calls.is_empty());
        assert!(!model.requests()[0].had_tools);

        let run = store.get_workflow_run(&result.workflow_run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.user_id, "user-1");
        assert!(run.started_at.is_some() && run.finished_at.is_some());
        let steps = store.list_agent_runs(&run.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_output_chains_verbatim_into_next_step() {
        let step_one_output = "  facts:\n- one\n- two  ";
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("c1", "echo", r#"{"text":"lookup"}"#)]),
            text_response(step_one_output),
            text_response("final digest"),
        ]));
        let store = run_store();
        let loader = agents(vec![
            AgentConfig::new("researcher", "Research.", "m").with_tools(["echo"]),
            AgentConfig::new("writer", "Write.", "m"),
        ]);

        let result = sequencer(model.clone())
            .execute_workflow(
                &workflow(&[("gather", "researcher"), ("write", "writer")]),
                "rust async",
                "user-1",
                &loader,
                &store,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("final digest"));
        let requests = model.requests();
        assert_eq!(requests.len(), 3);
        let step_two_user = requests[2].messages.last().unwrap();
        assert_eq!(step_two_user.content, step_one_output);

        let step_one = &result.agent_runs[0];
        assert_eq!(step_one.tool_calls.len(), 1);
        let invocations = store.list_tool_invocations(&step_one.agent_run_id).await.unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].tool, "echo");
        assert_eq!(invocations[0].status, RunStatus::Completed);

        let orders: Vec<u32> = store
            .list_agent_runs(&result.workflow_run_id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.step_order)
            .collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_missing_agent_stops_before_creating_agent_run() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("first ok")]));
        let store = run_store();
        let loader = agents(vec![AgentConfig::new("a", "A.", "m"), AgentConfig::new("c", "C.", "m")]);

        let result = sequencer(model.clone())
            .execute_workflow(
                &workflow(&[("one", "a"), ("two", "ghost"), ("three", "c")]),
                "in",
                "user-1",
                &loader,
                &store,
            )
            .await
            .unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("Step 2 (TWO) failed:"), "{}", error);
        assert!(error.contains("ghost"));
        assert_eq!(result.agent_runs.len(), 1);
        assert_eq!(model.call_count(), 1);
        assert_eq!(store.list_agent_runs(&result.workflow_run_id).await.unwrap().len(), 1);

        let run = store.get_workflow_run(&result.workflow_run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.output.as_deref(), Some("first ok"));
    }

    #[tokio::test]
    async fn test_failing_step_stops_the_run() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("ok")]));
        let store = run_store();
        let loader = agents(vec![
            AgentConfig::new("a", "A.", "m"),
            AgentConfig::new("b", "B.", "m"),
            AgentConfig::new("c", "C.", "m"),
        ]);

        // Script runs dry on step 2, so its model call errors.
        let result = sequencer(model.clone())
            .execute_workflow(&workflow(&[("s1", "a"), ("s2", "b"), ("s3", "c")]), "in", "u", &loader, &store)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.agent_runs.len(), 2);
        assert!(!result.agent_runs[1].success);
        assert!(result.error.unwrap().starts_with("Step 2 (S2) failed: Model invocation failed"));

        let stored = store.list_agent_runs(&result.workflow_run_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].status, RunStatus::Failed);
        assert!(stored[1].error.is_some());
    }

    #[tokio::test]
    async fn test_repeated_failing_runs_are_independent() {
        let store = run_store();
        let loader: HashMap<String, AgentConfig> = HashMap::new();
        let wf = workflow(&[("only", "nobody")]);
        let seq = sequencer(Arc::new(ScriptedModel::new(vec![])));

        let first = seq.execute_workflow(&wf, "in", "u", &loader, &store).await.unwrap();
        let second = seq.execute_workflow(&wf, "in", "u", &loader, &store).await.unwrap();

        assert_ne!(first.workflow_run_id, second.workflow_run_id);
        assert!(first.error.is_some());
        assert_eq!(first.error, second.error);

        let mut stored_errors = Vec::new();
        for id in [&first.workflow_run_id, &second.workflow_run_id] {
            let run = store.get_workflow_run(id).await.unwrap().unwrap();
            assert_eq!(run.status, RunStatus::Failed);
            stored_errors.push(run.error);
        }
        assert_eq!(stored_errors[0], stored_errors[1]);
        assert_eq!(stored_errors[0], first.error);
    }

    #[tokio::test]
    async fn test_rejected_run_record_is_reported_as_failed_result() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("unused")]));
        let loader = agents(vec![AgentConfig::new("a", "A.", "m")]);

        let result = sequencer(model.clone())
            .execute_workflow(&workflow(&[("only", "a")]), "in", "u", &loader, &UnwritableSink)
            .await
            .expect("a sink failure is reported through the result");

        assert!(!result.success);
        assert!(!result.workflow_run_id.is_empty());
        assert!(result.agent_runs.is_empty());
        assert!(result.output.is_none());
        assert_eq!(result.error.as_deref(), Some("Database error: disk full"));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_workflow_is_rejected_before_any_record() {
        let store = run_store();
        let mut wf = workflow(&[("only", "a")]);
        wf.status = WorkflowStatus::Inactive;
        let loader = agents(vec![AgentConfig::new("a", "A.", "m")]);

        let err = sequencer(Arc::new(ScriptedModel::new(vec![])))
            .execute_workflow(&wf, "in", "u", &loader, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Validation(_)));
        assert!(store.list_workflow_runs("wf-test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments_are_recorded_as_failed_invocation() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("bad", "echo", "{not json")]),
            text_response("handled"),
        ]));
        let store = run_store();
        let loader = agents(vec![AgentConfig::new("a", "A.", "m").with_tools(["echo"])]);

        let result = sequencer(model)
            .execute_workflow(&workflow(&[("only", "a")]), "in", "u", &loader, &store)
            .await
            .unwrap();

        assert!(result.success);
        let invocations = store
            .list_tool_invocations(&result.agent_runs[0].agent_run_id)
            .await
            .unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].status, RunStatus::Failed);
        assert!(invocations[0].error.as_deref().unwrap().contains("Invalid JSON arguments"));
        assert_eq!(invocations[0].params, serde_json::Value::String("{not json".to_string()));
    }
}
