//! Commands module
//!
//! Defines all CLI commands, their handlers and shared output helpers.

mod config;
mod deployment;
mod infra;
mod pipeline;

pub use config::ConfigCommands;
pub use deployment::DeploymentCommands;
pub use infra::InfraCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use colored::*;
use keel_client::ClientError;
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::Operation;
use std::collections::BTreeMap;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Deployment management
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
    /// Pipeline, stage and step management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Infrastructure management
    Infra {
        #[command(subcommand)]
        command: InfraCommands,
    },
    /// Versioned configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, config).await
        }
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Infra { command } => infra::handle_infra_command(command, config).await,
        Commands::Config { command } => config::handle_config_command(command, config).await,
    }
}

/// Run lifecycle operation accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunAction {
    Start,
    Complete,
    Fail,
    Cancel,
}

impl From<RunAction> for Operation {
    fn from(action: RunAction) -> Self {
        match action {
            RunAction::Start => Operation::Start,
            RunAction::Complete => Operation::Complete,
            RunAction::Fail => Operation::Fail,
            RunAction::Cancel => Operation::Cancel,
        }
    }
}

/// Parse a single key=value pair
pub fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].trim();
    if key.is_empty() {
        anyhow::bail!("invalid KEY=value: empty key in `{}`", s);
    }
    Ok((key.to_string(), s[pos + 1..].to_string()))
}

/// Turn a transition rejection into an operator-facing error
pub fn explain(err: ClientError) -> anyhow::Error {
    if err.is_conflict() {
        anyhow::anyhow!("{} (not allowed from the current status)", err)
    } else if err.is_rate_limited() {
        anyhow::anyhow!("{}; the orchestrator is throttling requests", err)
    } else {
        err.into()
    }
}

/// Color a status name by how it reads to an operator
pub fn colored_status(status: &str) -> ColoredString {
    match status {
        "COMPLETED" | "ACTIVE" => status.green(),
        "FAILED" => status.red().bold(),
        "IN_PROGRESS" | "PROVISIONING" | "UPDATING" => status.yellow(),
        "CANCELLED" | "DELETING" => status.dimmed(),
        _ => status.normal(),
    }
}

pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Print per-status counts and any breakdowns the server sent
pub fn print_stats(title: &str, stats: &StatusStats) {
    println!("{}", format!("{} ({} total):", title, stats.total).bold());
    for (status, count) in &stats.by_status {
        println!("  {:<14} {}", colored_status(status), count);
    }
    if !stats.by_environment.is_empty() {
        print_breakdown("By environment", &stats.by_environment);
    }
    if !stats.by_type.is_empty() {
        print_breakdown("By type", &stats.by_type);
    }
}

pub fn print_breakdown(title: &str, counts: &BTreeMap<String, i64>) {
    println!("{}", format!("{}:", title).dimmed());
    for (name, count) in counts {
        println!("  {:<14} {}", name, count);
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("region=eu-west-1").unwrap(),
            ("region".to_string(), "eu-west-1".to_string())
        );
        assert_eq!(
            parse_key_val("url=postgres://h/db?a=b").unwrap(),
            ("url".to_string(), "postgres://h/db?a=b".to_string())
        );
        assert!(parse_key_val("no-equals").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_run_action_maps_to_operation() {
        assert_eq!(Operation::from(RunAction::Fail), Operation::Fail);
        assert_eq!(Operation::from(RunAction::Cancel), Operation::Cancel);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(None), "-");
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_time(Some(at)), "2024-05-01 10:20:30");
    }
}
