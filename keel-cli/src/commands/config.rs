//! Configuration command handlers
//!
//! Secrets are references (e.g. `vault:secret/app/db`), never values.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::domain::configuration::Configuration;
use keel_core::domain::environment::Environment;
use keel_core::dto::configuration::{CreateConfiguration, NewVersion, PatchConfiguration};
use std::str::FromStr;

use super::{format_time, parse_key_val, print_breakdown, print_json};
use crate::config::Config;
use crate::id_resolver::resolve_configuration_id;

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create a configuration version
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Environment,

        /// Defaults to 1.0.0
        #[arg(short, long)]
        version: Option<String>,

        #[arg(long, env = "USER")]
        created_by: String,

        /// Data entries as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        data: Vec<(String, String)>,

        /// Secret references as key=reference pairs
        #[arg(short, long, value_parser = parse_key_val)]
        secret: Vec<(String, String)>,
    },
    /// List configurations
    List {
        #[arg(short, long, value_parser = Environment::from_str)]
        environment: Option<Environment>,
    },
    /// Latest version of a configuration in an environment
    Latest {
        name: String,

        #[arg(value_parser = Environment::from_str)]
        environment: Environment,
    },
    /// A specific version of a configuration in an environment
    Version {
        name: String,

        #[arg(value_parser = Environment::from_str)]
        environment: Environment,

        version: String,
    },
    /// Get a configuration
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },
    /// Derive a new version carrying over data and secrets
    NewVersion {
        /// Configuration to derive from (ID or prefix)
        id: String,

        /// Defaults to the source version with the patch number bumped
        #[arg(short, long)]
        version: Option<String>,

        #[arg(long, env = "USER")]
        created_by: String,
    },
    /// Merge data entries or secret references into a configuration
    Set {
        id: String,

        #[arg(short, long, value_parser = parse_key_val)]
        data: Vec<(String, String)>,

        #[arg(short, long, value_parser = parse_key_val)]
        secret: Vec<(String, String)>,
    },
    /// Delete a configuration version
    Delete { id: String },
    /// Delete every version of a configuration in an environment
    Purge {
        name: String,

        #[arg(value_parser = Environment::from_str)]
        environment: Environment,
    },
    /// Configuration versions per environment
    Stats,
}

/// Handle configuration commands
pub async fn handle_config_command(command: ConfigCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ConfigCommands::Create {
            name,
            environment,
            version,
            created_by,
            data,
            secret,
        } => {
            let req = CreateConfiguration {
                name,
                environment,
                version,
                created_by,
                data: data.into_iter().collect(),
                secrets: secret.into_iter().collect(),
            };
            let created = client.create_configuration(req).await?;
            println!("{}", "✓ Configuration created!".green().bold());
            print_configuration(&created);
            Ok(())
        }
        ConfigCommands::List { environment } => list_configurations(&client, environment).await,
        ConfigCommands::Latest { name, environment } => {
            let latest = client.latest_configuration(&name, environment).await?;
            print_configuration(&latest);
            Ok(())
        }
        ConfigCommands::Version {
            name,
            environment,
            version,
        } => {
            let found = client
                .configuration_version(&name, environment, &version)
                .await?;
            print_configuration(&found);
            Ok(())
        }
        ConfigCommands::Get { id, json } => {
            let uuid = resolve_configuration_id(&client, &id).await?;
            let found = client.get_configuration(uuid).await?;
            if json {
                return print_json(&found);
            }
            print_configuration(&found);
            Ok(())
        }
        ConfigCommands::NewVersion {
            id,
            version,
            created_by,
        } => {
            let uuid = resolve_configuration_id(&client, &id).await?;
            let next = client
                .new_configuration_version(
                    uuid,
                    NewVersion {
                        version,
                        created_by,
                    },
                )
                .await?;
            println!("{}", "✓ New version created!".green().bold());
            print_configuration(&next);
            Ok(())
        }
        ConfigCommands::Set { id, data, secret } => {
            if data.is_empty() && secret.is_empty() {
                bail!("nothing to set: pass --data and/or --secret");
            }
            let uuid = resolve_configuration_id(&client, &id).await?;
            let req = PatchConfiguration {
                data: data.into_iter().collect(),
                secrets: secret.into_iter().collect(),
            };
            let patched = client.patch_configuration(uuid, req).await?;
            println!("{}", "✓ Configuration updated!".green().bold());
            print_configuration(&patched);
            Ok(())
        }
        ConfigCommands::Delete { id } => {
            let uuid = resolve_configuration_id(&client, &id).await?;
            client.delete_configuration(uuid).await?;
            println!(
                "{}",
                format!("✓ Configuration {} deleted!", uuid).green().bold()
            );
            Ok(())
        }
        ConfigCommands::Purge { name, environment } => {
            client.delete_configurations(&name, environment).await?;
            println!(
                "{}",
                format!("✓ All versions of {} in {} deleted!", name, environment)
                    .green()
                    .bold()
            );
            Ok(())
        }
        ConfigCommands::Stats => {
            let stats = client.configuration_stats().await?;
            println!("{}", format!("Configurations ({} total):", stats.total).bold());
            print_breakdown("By environment", &stats.by_environment);
            Ok(())
        }
    }
}

async fn list_configurations(
    client: &OrchestratorClient,
    environment: Option<Environment>,
) -> Result<()> {
    let configs = client.list_configurations(environment).await?;

    if configs.is_empty() {
        println!("{}", "No configurations found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} configuration(s):", configs.len()).bold()
    );
    println!();
    for config in &configs {
        println!(
            "  {} {} {} v{}",
            "▸".cyan(),
            config.name.bold(),
            config.environment,
            config.version
        );
        println!("    ID:      {}", config.id.to_string().dimmed());
        println!(
            "    Created: {} by {}",
            format_time(Some(config.created_at)).dimmed(),
            config.created_by
        );
        println!();
    }

    Ok(())
}

fn print_configuration(config: &Configuration) {
    println!("  ID:          {}", config.id.to_string().cyan());
    println!("  Name:        {}", config.name.bold());
    println!("  Environment: {}", config.environment);
    println!("  Version:     {}", config.version);
    println!("  Created by:  {}", config.created_by);
    println!("  Updated:     {}", format_time(Some(config.updated_at)));

    let mut data: Vec<_> = config.data.iter().collect();
    data.sort();
    if !data.is_empty() {
        println!("  Data:");
        for (key, value) in data {
            println!("    {} = {}", key.cyan(), value);
        }
    }

    let mut secrets: Vec<_> = config.secrets.iter().collect();
    secrets.sort();
    if !secrets.is_empty() {
        println!("  Secrets:");
        for (key, reference) in secrets {
            println!("    {} -> {}", key.cyan(), reference.dimmed());
        }
    }
}
