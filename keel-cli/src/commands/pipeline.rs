//! Pipeline command handlers
//!
//! Pipelines, their stages and their steps. Stage and step IDs may be given
//! as prefixes; they are resolved within the pipeline.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::domain::pipeline::Pipeline;
use keel_core::dto::pipeline::{CreatePipeline, NewStage, PipelineSummary};
use keel_core::lifecycle::{Operation, RunStatus};
use std::str::FromStr;

use super::{RunAction, colored_status, explain, format_time, print_json, print_stats};
use crate::config::Config;
use crate::id_resolver::{
    resolve_deployment_id, resolve_pipeline_id, resolve_stage_id, resolve_step_id,
};

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a pipeline for a deployment
    Create {
        /// Deployment ID or unambiguous prefix
        #[arg(short, long)]
        deployment: String,

        #[arg(short, long)]
        name: String,

        /// Stages in order, as `name:step1,step2`
        #[arg(short, long, value_parser = parse_stage)]
        stage: Vec<NewStage>,
    },
    /// List pipelines
    List {
        #[arg(long, value_parser = RunStatus::from_str)]
        status: Option<RunStatus>,

        /// Only pipelines of this deployment (ID or prefix)
        #[arg(short, long)]
        deployment: Option<String>,

        /// Show only the N most recent pipelines
        #[arg(long)]
        recent: Option<i64>,
    },
    /// Get pipeline details with stages and steps
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Also print step logs
        #[arg(short, long)]
        logs: bool,

        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Start a pipeline
    Start { id: String },
    /// Mark a pipeline as completed
    Complete { id: String },
    /// Mark a pipeline as failed
    Fail {
        id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Cancel a pipeline
    Cancel { id: String },
    /// Delete a pipeline
    Delete { id: String },
    /// Apply an operation to a stage
    Stage {
        /// Pipeline ID or unambiguous prefix
        pipeline: String,

        /// Stage ID or prefix within the pipeline
        stage: String,

        #[arg(value_enum)]
        action: RunAction,

        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Apply an operation to a step, or append to its logs
    Step {
        /// Pipeline ID or unambiguous prefix
        pipeline: String,

        /// Stage ID or prefix within the pipeline
        stage: String,

        /// Step ID or prefix within the stage
        step: String,

        #[arg(value_enum, required_unless_present = "log")]
        action: Option<RunAction>,

        #[arg(short, long)]
        reason: Option<String>,

        /// Append this text to the step logs
        #[arg(long, conflicts_with = "action")]
        log: Option<String>,
    },
    /// IN_PROGRESS pipelines running longer than the threshold
    LongRunning {
        /// Threshold in minutes
        #[arg(short, long)]
        minutes: Option<i64>,
    },
    /// Pipeline counts per status
    Stats,
}

/// Parse a stage given as `name:step1,step2` (steps optional)
fn parse_stage(s: &str) -> Result<NewStage> {
    let (name, steps) = match s.split_once(':') {
        Some((name, steps)) => (name.trim(), steps),
        None => (s.trim(), ""),
    };
    if name.is_empty() {
        bail!("invalid stage `{}`: name is empty", s);
    }

    let steps = steps
        .split(',')
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect();

    Ok(NewStage {
        name: name.to_string(),
        steps,
    })
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Create {
            deployment,
            name,
            stage,
        } => create_pipeline(&client, &deployment, name, stage).await,
        PipelineCommands::List {
            status,
            deployment,
            recent,
        } => list_pipelines(&client, status, deployment.as_deref(), recent).await,
        PipelineCommands::Get { id, logs, json } => get_pipeline(&client, &id, logs, json).await,
        PipelineCommands::Start { id } => transition(&client, &id, Operation::Start, None).await,
        PipelineCommands::Complete { id } => {
            transition(&client, &id, Operation::Complete, None).await
        }
        PipelineCommands::Fail { id, reason } => {
            transition(&client, &id, Operation::Fail, reason.as_deref()).await
        }
        PipelineCommands::Cancel { id } => transition(&client, &id, Operation::Cancel, None).await,
        PipelineCommands::Delete { id } => delete_pipeline(&client, &id).await,
        PipelineCommands::Stage {
            pipeline,
            stage,
            action,
            reason,
        } => transition_stage(&client, &pipeline, &stage, action.into(), reason.as_deref()).await,
        PipelineCommands::Step {
            pipeline,
            stage,
            step,
            action,
            reason,
            log,
        } => {
            let target = StepTarget {
                pipeline: &pipeline,
                stage: &stage,
                step: &step,
            };
            match (action, log) {
                (_, Some(text)) => append_logs(&client, target, &text).await,
                (Some(action), None) => {
                    transition_step(&client, target, action.into(), reason.as_deref()).await
                }
                (None, None) => bail!("either an action or --log is required"),
            }
        }
        PipelineCommands::LongRunning { minutes } => long_running(&client, minutes).await,
        PipelineCommands::Stats => {
            let stats = client.pipeline_stats().await?;
            print_stats("Pipelines", &stats);
            Ok(())
        }
    }
}

async fn create_pipeline(
    client: &OrchestratorClient,
    deployment: &str,
    name: String,
    stages: Vec<NewStage>,
) -> Result<()> {
    let deployment_id = resolve_deployment_id(client, deployment).await?;

    let pipeline = client
        .create_pipeline(CreatePipeline {
            name,
            deployment_id,
            stages,
        })
        .await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:         {}", pipeline.id.to_string().cyan());
    println!("  Name:       {}", pipeline.name.bold());
    println!("  Deployment: {}", pipeline.deployment_id.to_string().dimmed());
    println!(
        "  Stages:     {}",
        pipeline
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );

    Ok(())
}

async fn list_pipelines(
    client: &OrchestratorClient,
    status: Option<RunStatus>,
    deployment: Option<&str>,
    recent: Option<i64>,
) -> Result<()> {
    let pipelines = if let Some(limit) = recent {
        client.recent_pipelines(Some(limit)).await?
    } else {
        let deployment_id = match deployment {
            Some(id) => Some(resolve_deployment_id(client, id).await?),
            None => None,
        };
        client.list_pipelines(status, deployment_id).await?
    };

    print_pipeline_list(&pipelines, "No pipelines found.");
    Ok(())
}

async fn long_running(client: &OrchestratorClient, minutes: Option<i64>) -> Result<()> {
    let pipelines = client.long_running_pipelines(minutes).await?;
    print_pipeline_list(&pipelines, "No long-running pipelines.");
    Ok(())
}

async fn get_pipeline(client: &OrchestratorClient, id: &str, logs: bool, json: bool) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.get_pipeline(uuid).await?;

    if json {
        return print_json(&pipeline);
    }
    print_pipeline_details(&pipeline, logs);

    Ok(())
}

async fn transition(
    client: &OrchestratorClient,
    id: &str,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client
        .transition_pipeline(uuid, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Pipeline {} is now {}",
        "✓".green().bold(),
        pipeline.name.bold(),
        colored_status(pipeline.lifecycle.status().as_str())
    );

    Ok(())
}

async fn delete_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;

    client.delete_pipeline(uuid).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn transition_stage(
    client: &OrchestratorClient,
    pipeline: &str,
    stage: &str,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let pipeline_id = resolve_pipeline_id(client, pipeline).await?;
    let pipeline = client.get_pipeline(pipeline_id).await?;
    let stage_id = resolve_stage_id(&pipeline, stage)?;

    let stage = client
        .transition_stage(pipeline_id, stage_id, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Stage {} is now {}",
        "✓".green().bold(),
        stage.name.bold(),
        colored_status(stage.lifecycle.status().as_str())
    );

    Ok(())
}

#[derive(Clone, Copy)]
struct StepTarget<'a> {
    pipeline: &'a str,
    stage: &'a str,
    step: &'a str,
}

impl StepTarget<'_> {
    /// Resolve to (pipeline, stage, step) IDs
    async fn resolve(
        self,
        client: &OrchestratorClient,
    ) -> Result<(uuid::Uuid, uuid::Uuid, uuid::Uuid)> {
        let pipeline_id = resolve_pipeline_id(client, self.pipeline).await?;
        let pipeline = client.get_pipeline(pipeline_id).await?;
        let stage_id = resolve_stage_id(&pipeline, self.stage)?;
        let step_id = resolve_step_id(&pipeline, stage_id, self.step)?;
        Ok((pipeline_id, stage_id, step_id))
    }
}

async fn transition_step(
    client: &OrchestratorClient,
    target: StepTarget<'_>,
    operation: Operation,
    reason: Option<&str>,
) -> Result<()> {
    let (pipeline_id, stage_id, step_id) = target.resolve(client).await?;

    let step = client
        .transition_step(pipeline_id, stage_id, step_id, operation, reason)
        .await
        .map_err(explain)?;

    println!(
        "{} Step {} is now {}",
        "✓".green().bold(),
        step.name.bold(),
        colored_status(step.lifecycle.status().as_str())
    );

    Ok(())
}

async fn append_logs(client: &OrchestratorClient, target: StepTarget<'_>, text: &str) -> Result<()> {
    let (pipeline_id, stage_id, step_id) = target.resolve(client).await?;

    let step = client
        .append_step_logs(pipeline_id, stage_id, step_id, text)
        .await?;

    println!(
        "{} Appended to logs of step {} ({} lines)",
        "✓".green().bold(),
        step.name.bold(),
        step.logs.lines().count()
    );

    Ok(())
}

fn print_pipeline_list(pipelines: &[PipelineSummary], empty: &str) {
    if pipelines.is_empty() {
        println!("{}", empty.yellow());
        return;
    }

    println!(
        "{}",
        format!("Found {} pipeline(s):", pipelines.len()).bold()
    );
    println!();
    for pipeline in pipelines {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            pipeline.name.bold(),
            colored_status(pipeline.status.as_str())
        );
        println!("    ID:         {}", pipeline.id.to_string().dimmed());
        println!("    Deployment: {}", pipeline.deployment_id.to_string().dimmed());
        println!(
            "    Started:    {}  Stages: {}",
            format_time(pipeline.started_at),
            pipeline.stage_count
        );
        println!();
    }
}

fn print_pipeline_details(pipeline: &Pipeline, logs: bool) {
    let lifecycle = &pipeline.lifecycle;

    println!("{}", "Pipeline Details:".bold());
    println!("  ID:         {}", pipeline.id.to_string().cyan());
    println!("  Name:       {}", pipeline.name.bold());
    println!("  Deployment: {}", pipeline.deployment_id);
    println!("  Status:     {}", colored_status(lifecycle.status().as_str()));
    println!("  Created:    {}", format_time(Some(pipeline.created_at)));
    println!("  Started:    {}", format_time(lifecycle.started_at()));
    println!("  Completed:  {}", format_time(lifecycle.completed_at()));
    if let Some(error) = lifecycle.error_message() {
        println!("  Error:      {}", error.red());
    }

    for stage in &pipeline.stages {
        println!(
            "\n  {} {} {} {}",
            "■".cyan(),
            stage.name.bold(),
            colored_status(stage.lifecycle.status().as_str()),
            stage.id.to_string().dimmed()
        );
        for step in &stage.steps {
            println!(
                "    {} {} {} {}",
                "▸".cyan(),
                step.name,
                colored_status(step.lifecycle.status().as_str()),
                step.id.to_string().dimmed()
            );
            if logs && !step.logs.is_empty() {
                println!("{}", "─".repeat(80).dimmed());
                print!("{}", step.logs);
                println!("{}", "─".repeat(80).dimmed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_with_steps() {
        let stage = parse_stage("build: compile, unit-tests ,").unwrap();
        assert_eq!(stage.name, "build");
        assert_eq!(stage.steps, vec!["compile", "unit-tests"]);
    }

    #[test]
    fn test_parse_stage_without_steps() {
        let stage = parse_stage("approval").unwrap();
        assert_eq!(stage.name, "approval");
        assert!(stage.steps.is_empty());
    }

    #[test]
    fn test_parse_stage_requires_name() {
        assert!(parse_stage(":compile").is_err());
    }
}
