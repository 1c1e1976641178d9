//! Infrastructure command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use keel_client::{InfrastructureQuery, OrchestratorClient};
use keel_core::domain::environment::Environment;
use keel_core::domain::infrastructure::{Infrastructure, InfrastructureType};
use keel_core::dto::infrastructure::{CreateInfrastructure, UpdateInfrastructure};
use keel_core::lifecycle::{InfrastructureStatus, Operation};
use std::collections::HashMap;
use std::str::FromStr;

use super::{colored_status, explain, format_time, parse_key_val, print_json, print_stats};
use crate::config::Config;
use crate::id_resolver::resolve_infrastructure_id;

/// Infrastructure subcommands
#[derive(Subcommand)]
pub enum InfraCommands {
    /// Register infrastructure (starts PROVISIONING)
    Create {
        #[arg(short, long)]
        name: String,

        /// kubernetes, vm or serverless
        #[arg(short = 't', long = "type", value_parser = InfrastructureType::from_str)]
        infra_type: InfrastructureType,

        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Environment,

        /// Resources as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        resource: Vec<(String, String)>,
    },
    /// List infrastructure
    List {
        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Option<Environment>,

        #[arg(short = 't', long = "type", value_parser = InfrastructureType::from_str)]
        infra_type: Option<InfrastructureType>,

        #[arg(long, value_parser = InfrastructureStatus::from_str)]
        status: Option<InfrastructureStatus>,
    },
    /// Get infrastructure details
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },
    /// Rename or replace resources without changing status
    Edit {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Replacement resources as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        resource: Vec<(String, String)>,
    },
    /// Mark provisioning or an update as done (-> ACTIVE)
    Activate { id: String },
    /// Begin an update of active infrastructure (-> UPDATING)
    Update { id: String },
    /// Mark infrastructure as failed
    Fail {
        id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Begin tearing infrastructure down (-> DELETING)
    Decommission { id: String },
    /// Remove the record entirely
    Remove { id: String },
    /// Infrastructure counts per status
    Stats,
}

/// Handle infrastructure commands
pub async fn handle_infra_command(command: InfraCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        InfraCommands::Create {
            name,
            infra_type,
            environment,
            resource,
        } => {
            let req = CreateInfrastructure {
                name,
                infra_type,
                environment,
                resources: resource.into_iter().collect(),
            };
            create_infrastructure(&client, req).await
        }
        InfraCommands::List {
            environment,
            infra_type,
            status,
        } => {
            let filter = InfrastructureQuery {
                environment,
                infra_type,
                status,
            };
            list_infrastructure(&client, filter).await
        }
        InfraCommands::Get { id, json } => get_infrastructure(&client, &id, json).await,
        InfraCommands::Edit { id, name, resource } => {
            let resources: HashMap<String, String> = resource.into_iter().collect();
            let req = UpdateInfrastructure {
                name,
                resources: (!resources.is_empty()).then_some(resources),
            };
            edit_infrastructure(&client, &id, req).await
        }
        InfraCommands::Activate { id } => {
            transition(&client, &id, Operation::Activate, None).await
        }
        InfraCommands::Update { id } => transition(&client, &id, Operation::Update, None).await,
        InfraCommands::Fail { id, reason } => {
            transition(&client, &id, Operation::Fail, reason.as_deref()).await
        }
        InfraCommands::Decommission { id } => {
            transition(&client, &id, Operation::Delete, None).await
        }
        InfraCommands::Remove { id } => remove_infrastructure(&client, &id).await,
        InfraCommands::Stats => {
            let stats = client.infrastructure_stats().await?;
            print_stats("Infrastructure", &stats);
            Ok(())
        }
    }
}

async fn create_infrastructure(client: &OrchestratorClient, req: CreateInfrastructure) -> Result<()> {
    let infra = client.create_infrastructure(req).await?;

    println!("{}", "✓ Infrastructure registered!".green().bold());
    print_infrastructure(&infra);

    Ok(())
}

async fn list_infrastructure(client: &OrchestratorClient, filter: InfrastructureQuery) -> Result<()> {
    let items = client.list_infrastructure(filter).await?;

    if items.is_empty() {
        println!("{}", "No infrastructure found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} infrastructure record(s):", items.len()).bold()
    );
    println!();
    for infra in &items {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            infra.name.bold(),
            colored_status(infra.lifecycle.status().as_str())
        );
        println!("    ID:   {}", infra.id.to_string().dimmed());
        println!("    Type: {}  Environment: {}", infra.infra_type, infra.environment);
        println!();
    }

    Ok(())
}

async fn get_infrastructure(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let uuid = resolve_infrastructure_id(client, id).await?;
    let infra = client.get_infrastructure(uuid).await?;

    if json {
        return print_json(&infra);
    }

    println!("{}", "Infrastructure Details:".bold());
    print_infrastructure(&infra);

    Ok(())
}

async fn edit_infrastructure(
    client: &OrchestratorClient,
    id: &str,
    req: UpdateInfrastructure,
) -> Result<()> {
    let uuid = resolve_infrastructure_id(client, id).await?;
    let infra = client.update_infrastructure(uuid, req).await?;

    println!("{}", "✓ Infrastructure updated!".green().bold());
    print_infrastructure(&infra);

    Ok(())
}

async fn transition(
    client: &OrchestratorClient,
    id: &str,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let uuid = resolve_infrastructure_id(client, id).await?;
    let infra = client
        .transition_infrastructure(uuid, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Infrastructure {} is now {}",
        "✓".green().bold(),
        infra.name.bold(),
        colored_status(infra.lifecycle.status().as_str())
    );

    Ok(())
}

async fn remove_infrastructure(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_infrastructure_id(client, id).await?;

    client.remove_infrastructure(uuid).await?;

    println!(
        "{}",
        format!("✓ Infrastructure {} removed!", uuid).green().bold()
    );

    Ok(())
}

fn print_infrastructure(infra: &Infrastructure) {
    println!("  ID:          {}", infra.id.to_string().cyan());
    println!("  Name:        {}", infra.name.bold());
    println!("  Type:        {}", infra.infra_type);
    println!("  Environment: {}", infra.environment);
    println!(
        "  Status:      {}",
        colored_status(infra.lifecycle.status().as_str())
    );
    println!("  Updated:     {}", format_time(Some(infra.updated_at)));
    if let Some(error) = infra.lifecycle.error_message() {
        println!("  Error:       {}", error.red());
    }
    if !infra.resources.is_empty() {
        let mut resources: Vec<_> = infra.resources.iter().collect();
        resources.sort();
        println!("  Resources:");
        for (key, value) in resources {
            println!("    {} = {}", key.cyan(), value);
        }
    }
}
