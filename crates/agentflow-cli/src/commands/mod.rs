//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and works against
//! the agentflow-core stores through `CliState`.

pub mod agent;
pub mod run;
pub mod tools;
pub mod workflow;

use agentflow_core::store::{AgentStore, RunStore};
use agentflow_core::Database;

/// Stores shared by every command.
#[derive(Clone)]
pub struct CliState {
    pub db: Database,
    pub agents: AgentStore,
    pub runs: RunStore,
}

impl CliState {
    pub fn new(db: Database) -> Self {
        Self {
            agents: AgentStore::new(db.clone()),
            runs: RunStore::new(db.clone()),
            db,
        }
    }
}

/// Open the SQLite database at `db_path` and build the command state.
pub fn init_state(db_path: &str) -> CliState {
    let db = Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });
    CliState::new(db)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Load `.env.local` then `.env` into the process environment.
/// Variables that are already set are left untouched.
pub fn load_dotenv() {
    for filename in [".env.local", ".env"] {
        let Ok(content) = std::fs::read_to_string(filename) else {
            continue;
        };
        for (key, value) in parse_dotenv(&content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(&key, &value);
            }
        }
        tracing::info!("[Config] Loaded environment from '{}'", filename);
    }
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments and stripping
/// one layer of matching quotes.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
                .unwrap_or(value);
            Some((key.to_string(), unquoted.to_string()))
        })
        .collect()
}
