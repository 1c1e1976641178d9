//! ID resolver module
//!
//! Resolves UUID prefixes to full UUIDs by listing the candidates through the
//! API. Users can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use keel_client::{InfrastructureQuery, OrchestratorClient};
use keel_core::domain::pipeline::Pipeline;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Pick the single candidate matching `id_or_prefix`
///
/// `kind` names the resource in error messages.
pub fn match_prefix(
    kind: &str,
    id_or_prefix: &IdOrPrefix,
    candidates: impl IntoIterator<Item = Uuid>,
) -> Result<Uuid> {
    let matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}

pub async fn resolve_deployment_id(client: &OrchestratorClient, id: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(id);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let deployments = client
        .list_deployments(None, None)
        .await
        .context("Failed to fetch deployments for ID resolution")?;

    match_prefix("deployment", &id_or_prefix, deployments.iter().map(|d| d.id))
}

pub async fn resolve_pipeline_id(client: &OrchestratorClient, id: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(id);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines(None, None)
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    match_prefix("pipeline", &id_or_prefix, pipelines.iter().map(|p| p.id))
}

pub async fn resolve_infrastructure_id(client: &OrchestratorClient, id: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(id);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let infrastructure = client
        .list_infrastructure(InfrastructureQuery::default())
        .await
        .context("Failed to fetch infrastructure for ID resolution")?;

    match_prefix(
        "infrastructure",
        &id_or_prefix,
        infrastructure.iter().map(|i| i.id),
    )
}

pub async fn resolve_configuration_id(client: &OrchestratorClient, id: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(id);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let configurations = client
        .list_configurations(None)
        .await
        .context("Failed to fetch configurations for ID resolution")?;

    match_prefix(
        "configuration",
        &id_or_prefix,
        configurations.iter().map(|c| c.id),
    )
}

/// Resolve a stage ID or prefix within an already fetched pipeline
pub fn resolve_stage_id(pipeline: &Pipeline, id: &str) -> Result<Uuid> {
    match_prefix(
        "stage",
        &IdOrPrefix::parse(id),
        pipeline.stages.iter().map(|s| s.id),
    )
}

/// Resolve a step ID or prefix within one stage of a pipeline
pub fn resolve_step_id(pipeline: &Pipeline, stage_id: Uuid, id: &str) -> Result<Uuid> {
    let stage = pipeline
        .stage(stage_id)
        .ok_or_else(|| anyhow!("Stage {} not found in pipeline {}", stage_id, pipeline.id))?;

    match_prefix(
        "step",
        &IdOrPrefix::parse(id),
        stage.steps.iter().map(|s| s.id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let a = id("aa11aa11-0000-4000-8000-000000000000");
        let b = id("bb22bb22-0000-4000-8000-000000000000");

        let resolved = match_prefix("deployment", &IdOrPrefix::parse("aa1"), [a, b]).unwrap();
        assert_eq!(resolved, a);
    }

    #[test]
    fn test_ambiguous_prefix_lists_candidates() {
        let a = id("aa11aa11-0000-4000-8000-000000000000");
        let b = id("aa22bb22-0000-4000-8000-000000000000");

        let err = match_prefix("pipeline", &IdOrPrefix::parse("aa"), [a, b]).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Ambiguous prefix 'aa' matches multiple pipelines"));
        assert!(message.contains(&a.to_string()));
        assert!(message.contains(&b.to_string()));
    }

    #[test]
    fn test_unknown_prefix() {
        let a = id("aa11aa11-0000-4000-8000-000000000000");
        let err = match_prefix("configuration", &IdOrPrefix::parse("ff"), [a]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No configuration found with ID starting with 'ff'"
        );
    }

    #[test]
    fn test_stage_and_step_resolution() {
        let mut pipeline = Pipeline::new("release", Uuid::new_v4());
        let stage = pipeline.add_stage("build");
        stage.add_step("compile");
        let stage_id = stage.id;
        let step_id = stage.steps[0].id;

        let short = &stage_id.to_string()[..8];
        assert_eq!(resolve_stage_id(&pipeline, short).unwrap(), stage_id);
        assert_eq!(
            resolve_step_id(&pipeline, stage_id, &step_id.to_string()).unwrap(),
            step_id
        );
        assert!(resolve_step_id(&pipeline, Uuid::new_v4(), "00").is_err());
    }
}
