//! `agentflow run`: Inspect recorded workflow runs.

use serde_json::json;

use super::{print_json, CliState};

/// A workflow run with its agent runs and their tool invocations nested inside.
pub async fn collect(state: &CliState, run_id: &str) -> Result<serde_json::Value, String> {
    let run = state
        .runs
        .get_workflow_run(run_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Workflow run '{}' not found", run_id))?;

    let mut steps = Vec::new();
    for agent_run in state.runs.list_agent_runs(run_id).await.map_err(|e| e.to_string())? {
        let invocations = state
            .runs
            .list_tool_invocations(&agent_run.id)
            .await
            .map_err(|e| e.to_string())?;
        let mut value = serde_json::to_value(&agent_run).map_err(|e| e.to_string())?;
        value["toolInvocations"] = serde_json::to_value(&invocations).map_err(|e| e.to_string())?;
        steps.push(value);
    }

    Ok(json!({
        "run": run,
        "agentRuns": steps,
    }))
}

pub async fn show(state: &CliState, run_id: &str) -> Result<(), String> {
    let value = collect(state, run_id).await?;
    print_json(&value);
    Ok(())
}
