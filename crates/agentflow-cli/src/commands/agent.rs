//! `agentflow agent`: Agent definition commands.

use agentflow_core::models::AgentConfig;

use super::{print_json, CliState};

/// Upsert every agent found in a YAML file. Returns the imported ids.
pub async fn import(state: &CliState, file: &str) -> Result<Vec<String>, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read agent file '{}': {}", file, e))?;
    let agents = AgentConfig::list_from_yaml(&content)?;
    if agents.is_empty() {
        return Err(format!("No agents defined in '{}'", file));
    }

    let mut ids = Vec::with_capacity(agents.len());
    for agent in &agents {
        if agent.id.trim().is_empty() {
            return Err("Agent id must not be empty".to_string());
        }
        state.agents.save(agent).await.map_err(|e| e.to_string())?;
        println!("✅ Imported agent '{}' (model: {}, tools: {})", agent.id, agent.model, agent.tools.len());
        ids.push(agent.id.clone());
    }
    Ok(ids)
}

pub async fn list(state: &CliState) -> Result<(), String> {
    let agents = state.agents.list().await.map_err(|e| e.to_string())?;
    print_json(&serde_json::to_value(&agents).map_err(|e| e.to_string())?);
    Ok(())
}

/// Remove a stored agent. Workflows naming it fail at that step until it is re-imported.
pub async fn delete(state: &CliState, agent_id: &str) -> Result<(), String> {
    if !state.agents.delete(agent_id).await.map_err(|e| e.to_string())? {
        return Err(format!("Agent not found: {}", agent_id));
    }
    println!("🗑️  Deleted agent '{}'", agent_id);
    Ok(())
}
