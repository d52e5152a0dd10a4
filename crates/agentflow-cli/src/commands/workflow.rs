//! `agentflow workflow`: Validate and run YAML-defined agent workflows.

use std::sync::Arc;

use agentflow_core::agent::{TurnExecutor, TurnOptions};
use agentflow_core::llm::{build_model_client, ModelClient};
use agentflow_core::ratelimit::RateLimiter;
use agentflow_core::store::SqliteRateLimiter;
use agentflow_core::tools::LocalToolRegistry;
use agentflow_core::workflow::{WorkflowDefinition, WorkflowExecutionResult, WorkflowSequencer};
use agentflow_core::EngineConfig;

use super::{load_dotenv, print_json, CliState};

const RUN_ACTION: &str = "workflow.run";

/// Validate a workflow YAML file without executing it.
pub async fn validate(state: &CliState, workflow_file: &str) -> Result<(), String> {
    let workflow = WorkflowDefinition::from_file(workflow_file)?;
    workflow.ensure_runnable().map_err(|e| e.to_string())?;

    println!("✅ Workflow '{}' is valid", workflow.display_name());
    println!("   Id: {}", workflow.id);
    println!("   Trigger: {}", workflow.trigger.trigger_type);
    println!("   Steps: {}", workflow.steps.len());

    for (i, step) in workflow.ordered_steps().iter().enumerate() {
        let known = state
            .agents
            .get(&step.agent_id)
            .await
            .map_err(|e| e.to_string())?
            .is_some();
        println!(
            "   {}. {} (agent: {}{})",
            i + 1,
            step.display_name(),
            step.agent_id,
            if known { "" } else { ", not imported" }
        );
    }

    for warning in workflow.lint() {
        println!("   ⚠️  {}", warning);
    }

    Ok(())
}

/// Run a workflow from a YAML file against the configured model endpoint.
pub async fn run(state: &CliState, workflow_file: &str, input: &str, user_id: &str) -> Result<(), String> {
    load_dotenv();

    let workflow = WorkflowDefinition::from_file(workflow_file)?;
    let config = EngineConfig::from_env().map_err(|e| e.to_string())?;
    config.require_api_key().map_err(|e| e.to_string())?;

    tracing::info!(
        "[Workflow] Using {} adapter at {}",
        config.adapter.as_str(),
        config.base_url
    );

    let limiter = SqliteRateLimiter::new(state.db.clone(), config.rate_limit, config.rate_window);
    let model = build_model_client(&config);
    let result = execute(state, &workflow, input, user_id, model, &limiter, config.turn_options()).await?;

    print_json(&serde_json::to_value(&result).map_err(|e| e.to_string())?);

    if result.success {
        Ok(())
    } else {
        Err(format!(
            "Workflow run {} failed: {}",
            result.workflow_run_id,
            result.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Rate-limit check followed by one sequencer run.
pub async fn execute(
    state: &CliState,
    workflow: &WorkflowDefinition,
    input: &str,
    user_id: &str,
    model: Arc<dyn ModelClient>,
    limiter: &dyn RateLimiter,
    options: TurnOptions,
) -> Result<WorkflowExecutionResult, String> {
    let decision = limiter.check(user_id, RUN_ACTION).await.map_err(|e| e.to_string())?;
    if !decision.allowed {
        return Err(format!(
            "Rate limit exceeded for user '{}'; try again after {}",
            user_id,
            decision.reset_at.to_rfc3339()
        ));
    }

    let executor = TurnExecutor::new(model, Arc::new(LocalToolRegistry::with_builtins())).with_options(options);
    let sequencer = WorkflowSequencer::new(executor);
    sequencer
        .execute_workflow(workflow, input, user_id, &state.agents, &state.runs)
        .await
        .map_err(|e| e.to_string())
}
