//! Deployment command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::domain::deployment::{Deployment, Strategy};
use keel_core::domain::environment::Environment;
use keel_core::dto::deployment::{CreateDeployment, DeploymentSummary, NewComponent};
use keel_core::lifecycle::{Operation, RunStatus};
use std::str::FromStr;

use super::{RunAction, colored_status, explain, format_time, parse_key_val, print_json, print_stats};
use crate::config::Config;
use crate::id_resolver::resolve_deployment_id;
use crate::types::IdOrPrefix;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// Create a new deployment
    Create {
        #[arg(short, long)]
        name: String,

        /// Target environment (dev, staging, prod)
        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Environment,

        /// Rollout strategy (rolling, blue-green, canary)
        #[arg(short, long, value_parser = Strategy::from_str, default_value = "rolling")]
        strategy: Strategy,

        #[arg(long, env = "USER")]
        created_by: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Components as name=version pairs
        #[arg(short, long, value_parser = parse_key_val)]
        component: Vec<(String, String)>,

        /// Metadata as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },
    /// List deployments
    List {
        #[arg(long, value_parser = RunStatus::from_str)]
        status: Option<RunStatus>,

        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Option<Environment>,

        /// Show only the N most recent deployments
        #[arg(long)]
        recent: Option<i64>,
    },
    /// Get deployment details
    Get {
        /// Deployment ID or unambiguous prefix
        id: String,

        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Start a deployment
    Start { id: String },
    /// Mark a deployment as completed
    Complete { id: String },
    /// Mark a deployment as failed
    Fail {
        id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Cancel a deployment
    Cancel { id: String },
    /// Delete a deployment with its components and pipelines
    Delete { id: String },
    /// Add a component to a deployment
    AddComponent {
        /// Deployment ID or unambiguous prefix
        id: String,
        name: String,
        version: String,
    },
    /// Apply an operation to one component
    Component {
        /// Deployment ID or unambiguous prefix
        id: String,

        /// Component ID or unambiguous prefix
        component: String,

        #[arg(value_enum)]
        action: RunAction,

        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Deployment counts per status
    Stats,
}

/// Handle deployment commands
pub async fn handle_deployment_command(command: DeploymentCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        DeploymentCommands::Create {
            name,
            environment,
            strategy,
            created_by,
            description,
            component,
            meta,
        } => {
            let req = CreateDeployment {
                name,
                description,
                environment,
                strategy,
                created_by,
                metadata: meta.into_iter().collect(),
                components: component
                    .into_iter()
                    .map(|(name, version)| NewComponent { name, version })
                    .collect(),
            };
            create_deployment(&client, req).await
        }
        DeploymentCommands::List {
            status,
            environment,
            recent,
        } => list_deployments(&client, status, environment, recent).await,
        DeploymentCommands::Get { id, json } => get_deployment(&client, &id, json).await,
        DeploymentCommands::Start { id } => transition(&client, &id, Operation::Start, None).await,
        DeploymentCommands::Complete { id } => {
            transition(&client, &id, Operation::Complete, None).await
        }
        DeploymentCommands::Fail { id, reason } => {
            transition(&client, &id, Operation::Fail, reason.as_deref()).await
        }
        DeploymentCommands::Cancel { id } => {
            transition(&client, &id, Operation::Cancel, None).await
        }
        DeploymentCommands::Delete { id } => delete_deployment(&client, &id).await,
        DeploymentCommands::AddComponent { id, name, version } => {
            add_component(&client, &id, NewComponent { name, version }).await
        }
        DeploymentCommands::Component {
            id,
            component,
            action,
            reason,
        } => transition_component(&client, &id, &component, action.into(), reason.as_deref()).await,
        DeploymentCommands::Stats => {
            let stats = client.deployment_stats().await?;
            print_stats("Deployments", &stats);
            Ok(())
        }
    }
}

async fn create_deployment(client: &OrchestratorClient, req: CreateDeployment) -> Result<()> {
    let deployment = client.create_deployment(req).await?;

    println!("{}", "✓ Deployment created successfully!".green().bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!("  Name:        {}", deployment.name.bold());
    println!("  Environment: {}", deployment.environment);
    println!("  Strategy:    {}", deployment.strategy);
    println!("  Components:  {}", deployment.components.len());

    Ok(())
}

async fn list_deployments(
    client: &OrchestratorClient,
    status: Option<RunStatus>,
    environment: Option<Environment>,
    recent: Option<i64>,
) -> Result<()> {
    let deployments = match recent {
        Some(limit) => client.recent_deployments(Some(limit)).await?,
        None => client.list_deployments(status, environment).await?,
    };

    if deployments.is_empty() {
        println!("{}", "No deployments found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} deployment(s):", deployments.len()).bold()
        );
        println!();
        for deployment in &deployments {
            print_deployment_summary(deployment);
        }
    }

    Ok(())
}

async fn get_deployment(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let uuid = resolve_deployment_id(client, id).await?;
    let deployment = client.get_deployment(uuid).await?;

    if json {
        return print_json(&deployment);
    }
    print_deployment_details(&deployment);

    Ok(())
}

async fn transition(
    client: &OrchestratorClient,
    id: &str,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let uuid = resolve_deployment_id(client, id).await?;
    let deployment = client
        .transition_deployment(uuid, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Deployment {} is now {}",
        "✓".green().bold(),
        deployment.name.bold(),
        colored_status(deployment.lifecycle.status().as_str())
    );

    Ok(())
}

async fn delete_deployment(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_deployment_id(client, id).await?;

    client.delete_deployment(uuid).await?;

    println!(
        "{}",
        format!("✓ Deployment {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn add_component(client: &OrchestratorClient, id: &str, req: NewComponent) -> Result<()> {
    let uuid = resolve_deployment_id(client, id).await?;
    let component = client.add_component(uuid, req).await?;

    println!("{}", "✓ Component added!".green().bold());
    println!("  ID:      {}", component.id.to_string().cyan());
    println!("  Name:    {} {}", component.name.bold(), component.version.dimmed());

    Ok(())
}

async fn transition_component(
    client: &OrchestratorClient,
    id: &str,
    component: &str,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let uuid = resolve_deployment_id(client, id).await?;
    let deployment = client.get_deployment(uuid).await?;
    let component_id = crate::id_resolver::match_prefix(
        "component",
        &IdOrPrefix::parse(component),
        deployment.components.iter().map(|c| c.id),
    )?;

    let component = client
        .transition_component(uuid, component_id, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Component {} is now {}",
        "✓".green().bold(),
        component.name.bold(),
        colored_status(component.lifecycle.status().as_str())
    );

    Ok(())
}

fn print_deployment_summary(deployment: &DeploymentSummary) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        deployment.name.bold(),
        colored_status(deployment.status.as_str())
    );
    println!("    ID:          {}", deployment.id.to_string().dimmed());
    println!(
        "    Environment: {}  Strategy: {}",
        deployment.environment, deployment.strategy
    );
    println!(
        "    Created:     {} by {}",
        format_time(Some(deployment.created_at)).dimmed(),
        deployment.created_by
    );
    println!("    Components:  {}", deployment.component_count);
    println!();
}

fn print_deployment_details(deployment: &Deployment) {
    let lifecycle = &deployment.lifecycle;

    println!("{}", "Deployment Details:".bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!("  Name:        {}", deployment.name.bold());
    if let Some(desc) = &deployment.description {
        println!("  Description: {}", desc);
    }
    println!("  Status:      {}", colored_status(lifecycle.status().as_str()));
    println!("  Environment: {}", deployment.environment);
    println!("  Strategy:    {}", deployment.strategy);
    println!("  Created by:  {}", deployment.created_by);
    println!("  Created:     {}", format_time(Some(deployment.created_at)));
    println!("  Started:     {}", format_time(lifecycle.started_at()));
    println!("  Completed:   {}", format_time(lifecycle.completed_at()));
    if let Some(error) = lifecycle.error_message() {
        println!("  Error:       {}", error.red());
    }

    if !deployment.metadata.is_empty() {
        println!("\n{}", "Metadata:".bold());
        let mut entries: Vec<_> = deployment.metadata.iter().collect();
        entries.sort();
        for (key, value) in entries {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if !deployment.components.is_empty() {
        println!("\n{}", "Components:".bold());
        for component in &deployment.components {
            println!(
                "  {} {} {} {}",
                "▸".cyan(),
                component.name.bold(),
                component.version.dimmed(),
                colored_status(component.lifecycle.status().as_str())
            );
            println!("    ID: {}", component.id.to_string().dimmed());
        }
    }
}
