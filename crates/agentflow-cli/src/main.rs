//! agentflow CLI: import agents, then run and inspect multi-agent workflows.

use agentflow_cli::commands;
use clap::{Parser, Subcommand};

/// agentflow: sequential multi-agent workflows over tool-calling LLMs
#[derive(Parser)]
#[command(name = "agentflow", version, about = "agentflow: sequential multi-agent workflows")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "AGENTFLOW_DB_PATH", default_value = "agentflow.db")]
    db: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage agent definitions
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Validate and run YAML-defined workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Inspect recorded workflow runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Inspect the built-in tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Import (upsert) agents from a YAML file holding one agent or a list
    Import {
        /// Path to the agent YAML file
        file: String,
    },
    /// List stored agents
    List,
    /// Delete a stored agent
    Delete {
        /// Agent id
        id: String,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Validate a workflow YAML file without executing it
    Validate {
        /// Path to the workflow YAML file
        file: String,
    },
    /// Execute a workflow
    Run {
        /// Path to the workflow YAML file
        file: String,
        /// Input for the first step
        #[arg(long)]
        input: String,
        /// User the run is attributed to (and rate-limited by)
        #[arg(long, env = "AGENTFLOW_USER_ID", default_value = "local")]
        user_id: String,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// Show a workflow run with its agent runs and tool invocations
    Show {
        /// Workflow run ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List built-in tools and their parameter schemas
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentflow_core=info,agentflow_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Agent { action }) => {
            let state = commands::init_state(&cli.db);
            match action {
                AgentAction::Import { file } => commands::agent::import(&state, &file).await.map(|_| ()),
                AgentAction::List => commands::agent::list(&state).await,
                AgentAction::Delete { id } => commands::agent::delete(&state, &id).await,
            }
        }
        Some(Commands::Workflow { action }) => {
            let state = commands::init_state(&cli.db);
            match action {
                WorkflowAction::Validate { file } => commands::workflow::validate(&state, &file).await,
                WorkflowAction::Run { file, input, user_id } => {
                    commands::workflow::run(&state, &file, &input, &user_id).await
                }
            }
        }
        Some(Commands::Run { action }) => {
            let state = commands::init_state(&cli.db);
            match action {
                RunAction::Show { id } => commands::run::show(&state, &id).await,
            }
        }
        Some(Commands::Tools { action }) => match action {
            ToolsAction::List => commands::tools::list(),
        },
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
