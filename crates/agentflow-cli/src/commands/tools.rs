//! `agentflow tools`: Inspect the built-in tool registry.

use agentflow_core::tools::LocalToolRegistry;

use super::print_json;

pub fn list() -> Result<(), String> {
    let defs = LocalToolRegistry::with_builtins().all_definitions();
    print_json(&serde_json::to_value(&defs).map_err(|e| e.to_string())?);
    Ok(())
}
