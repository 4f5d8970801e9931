use std::env;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use voyage_agents::PlannerAgent;
use voyage_model::{DashScopeClient, DashScopeConfig};
use voyage_observability::{init_tracing, AppMetrics};
use voyage_storage::{PlanRepository, Store};

#[derive(Debug, Parser)]
#[command(name = "voyage")]
#[command(about = "Voyage Planner CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a spoken travel request into a structured intent.
    Intent { transcript: String },
    /// Parse a transcript and generate a full itinerary in one step.
    Plan {
        transcript: String,
        /// Save the generated plan under this name.
        #[arg(long)]
        save_as: Option<String>,
        /// Owner identity used for saved plans.
        #[arg(long, env = "VOYAGE_USER", default_value = "cli")]
        user: String,
    },
    /// Manage saved plans.
    Plans {
        #[command(subcommand)]
        command: PlansCommand,
    },
}

#[derive(Debug, Subcommand)]
enum PlansCommand {
    List {
        #[arg(long, env = "VOYAGE_USER", default_value = "cli")]
        user: String,
    },
    Get {
        id: String,
        #[arg(long, env = "VOYAGE_USER", default_value = "cli")]
        user: String,
    },
    Delete {
        id: String,
        #[arg(long, env = "VOYAGE_USER", default_value = "cli")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("voyage_cli");
    let cli = Cli::parse();

    let agent = build_agent()?;

    match cli.command {
        Command::Intent { transcript } => {
            let outcome = agent.parse_intent(&transcript).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Plan {
            transcript,
            save_as,
            user,
        } => {
            let intent = agent.parse_intent(&transcript).await;
            let outcome = agent.generate_plan(&intent.intent).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if let Some(name) = save_as {
                let store = durable_store().await?;
                let id = store.save_plan(&name, &outcome.plan, &user).await?;
                eprintln!("saved plan {id}");
            }
        }
        Command::Plans { command } => {
            let store = durable_store().await?;
            match command {
                PlansCommand::List { user } => {
                    let plans = store.list_plans(&user).await?;
                    println!("{}", serde_json::to_string_pretty(&plans)?);
                }
                PlansCommand::Get { id, user } => match store.get_plan(&id, &user).await? {
                    Some(saved) => println!("{}", serde_json::to_string_pretty(&saved)?),
                    None => eprintln!("plan {id} not found"),
                },
                PlansCommand::Delete { id, user } => {
                    if store.delete_plan(&id, &user).await? {
                        eprintln!("deleted plan {id}");
                    } else {
                        eprintln!("plan {id} not found");
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_agent() -> Result<PlannerAgent> {
    let metrics = AppMetrics::shared();
    let model = match DashScopeConfig::from_env() {
        Some(config) => Some(Arc::new(DashScopeClient::new(config)?)),
        None => None,
    };
    Ok(PlannerAgent::new(model, metrics))
}

// Saved plans only make sense against a store that outlives the process, so
// the persistence commands require a configured database instead of quietly
// writing into process-local memory.
async fn durable_store() -> Result<Store> {
    let Ok(database_url) = env::var("VOYAGE_DATABASE_URL") else {
        anyhow::bail!("VOYAGE_DATABASE_URL is not set; saved plans need a database");
    };
    Store::sqlite(&database_url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saving_plans_requires_a_database_url() {
        env::remove_var("VOYAGE_DATABASE_URL");
        let result = durable_store().await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("VOYAGE_DATABASE_URL"));
    }
}
