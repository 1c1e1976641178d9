//! Pipeline Service
//!
//! Business logic for pipelines, their stages and steps.

use chrono::TimeDelta;
use keel_core::domain::pipeline::{Pipeline, PipelineStage, PipelineStep};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::dto::pipeline::{CreatePipeline, PipelineSummary};
use keel_core::lifecycle::{self, CascadePolicy, EntityKind, Operation, Stateful};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    MAX_NAME_LEN, ServiceError, ServiceResult, cascades, recent_limit, require, require_bounded,
};
use crate::repository::pipeline::PipelineFilter;
use crate::repository::{deployment_repository, pipeline_repository};

/// Default age after which an IN_PROGRESS pipeline counts as long-running
pub const DEFAULT_LONG_RUNNING_MINUTES: i64 = 60;

/// Create a pipeline with its stages and steps
pub async fn create_pipeline(pool: &PgPool, req: CreatePipeline) -> ServiceResult<Pipeline> {
    validate_create(&req)?;

    let mut tx = pool.begin().await?;

    if !deployment_repository::exists(&mut *tx, req.deployment_id).await? {
        return Err(ServiceError::not_found(
            EntityKind::Deployment.as_str(),
            req.deployment_id,
        ));
    }

    let pipeline = req.into_pipeline();
    pipeline_repository::insert(&mut *tx, &pipeline).await?;
    tx.commit().await?;

    tracing::info!(
        "Pipeline created: {} ({}) for deployment: {}",
        pipeline.id,
        pipeline.name,
        pipeline.deployment_id
    );

    Ok(pipeline)
}

/// Get a pipeline by ID
pub async fn get_pipeline(pool: &PgPool, id: Uuid) -> ServiceResult<Pipeline> {
    let mut conn = pool.acquire().await?;
    pipeline_repository::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Pipeline.as_str(), id))
}

/// List pipelines matching the filter
pub async fn list_pipelines(
    pool: &PgPool,
    filter: PipelineFilter,
) -> ServiceResult<Vec<PipelineSummary>> {
    let pipelines = pipeline_repository::list(pool, filter, None).await?;
    Ok(pipelines.into_iter().map(PipelineSummary::from).collect())
}

/// Most recently created pipelines
pub async fn recent_pipelines(
    pool: &PgPool,
    limit: Option<i64>,
) -> ServiceResult<Vec<PipelineSummary>> {
    let limit = recent_limit(limit)?;
    let pipelines = pipeline_repository::list(pool, PipelineFilter::default(), Some(limit)).await?;
    Ok(pipelines.into_iter().map(PipelineSummary::from).collect())
}

/// IN_PROGRESS pipelines started more than `minutes` ago
pub async fn long_running_pipelines(
    pool: &PgPool,
    minutes: Option<i64>,
) -> ServiceResult<Vec<PipelineSummary>> {
    let minutes = minutes.unwrap_or(DEFAULT_LONG_RUNNING_MINUTES);
    if minutes <= 0 {
        return Err(ServiceError::Validation(format!(
            "minutes must be positive, got {}",
            minutes
        )));
    }

    let cutoff = lifecycle::now() - TimeDelta::minutes(minutes);
    let pipelines = pipeline_repository::find_started_before(pool, cutoff).await?;
    Ok(pipelines.into_iter().map(PipelineSummary::from).collect())
}

/// Number of pipelines per status
pub async fn pipeline_stats(pool: &PgPool) -> ServiceResult<StatusStats> {
    let counts = pipeline_repository::count_by_status(pool).await?;
    Ok(StatusStats::from_counts(counts))
}

/// Delete a pipeline with its stages and steps
pub async fn delete_pipeline(pool: &PgPool, id: Uuid) -> ServiceResult<()> {
    if !pipeline_repository::delete(pool, id).await? {
        return Err(ServiceError::not_found(EntityKind::Pipeline.as_str(), id));
    }

    tracing::info!("Pipeline {} deleted", id);
    Ok(())
}

// =============================================================================
// Transitions
// =============================================================================

/// Apply a lifecycle operation to a pipeline
///
/// Under [`CascadePolicy::Propagate`] a cancel or fail also cancels every open
/// stage and step.
pub async fn transition_pipeline(
    pool: &PgPool,
    cascade: CascadePolicy,
    id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<Pipeline> {
    let mut tx = pool.begin().await?;
    let mut pipeline = lock_pipeline(&mut tx, id).await?;

    let at = lifecycle::now();
    pipeline.transition_at(operation, reason, at)?;

    if cascades(cascade, operation) {
        let cancelled = pipeline.cancel_open_children(at);
        if cancelled > 0 {
            tracing::info!("Cancelled {} open stages and steps of pipeline {}", cancelled, id);
        }
    }

    pipeline_repository::save_lifecycles(&mut *tx, &pipeline).await?;
    tx.commit().await?;

    tracing::info!("Pipeline {} {} -> {}", id, operation, pipeline.status());

    Ok(pipeline)
}

/// Apply a lifecycle operation to one stage of a pipeline
pub async fn transition_stage(
    pool: &PgPool,
    cascade: CascadePolicy,
    pipeline_id: Uuid,
    stage_id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<PipelineStage> {
    let mut tx = pool.begin().await?;
    let mut pipeline = lock_pipeline(&mut tx, pipeline_id).await?;
    let stage = find_stage(&mut pipeline, stage_id)?;

    let at = lifecycle::now();
    stage.transition_at(operation, reason, at)?;

    if cascades(cascade, operation) {
        let cancelled = stage.cancel_open_steps(at);
        if cancelled > 0 {
            tracing::info!("Cancelled {} open steps of stage {}", cancelled, stage_id);
        }
    }

    pipeline_repository::save_stage_lifecycles(&mut *tx, stage).await?;
    let stage = stage.clone();
    tx.commit().await?;

    tracing::info!(
        "Stage {} of pipeline {} {} -> {}",
        stage_id,
        pipeline_id,
        operation,
        stage.status()
    );

    Ok(stage)
}

/// Apply a lifecycle operation to one step of a pipeline stage
pub async fn transition_step(
    pool: &PgPool,
    pipeline_id: Uuid,
    stage_id: Uuid,
    step_id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<PipelineStep> {
    let mut tx = pool.begin().await?;
    let mut pipeline = lock_pipeline(&mut tx, pipeline_id).await?;
    let step = find_step(&mut pipeline, stage_id, step_id)?;

    step.transition(operation, reason)?;

    // a failing step also carries the reason in its logs
    pipeline_repository::save_step(&mut *tx, step).await?;
    let step = step.clone();
    tx.commit().await?;

    tracing::info!(
        "Step {} of stage {} {} -> {}",
        step_id,
        stage_id,
        operation,
        step.status()
    );

    Ok(step)
}

/// Append timestamped log lines to a step
pub async fn append_step_logs(
    pool: &PgPool,
    pipeline_id: Uuid,
    stage_id: Uuid,
    step_id: Uuid,
    logs: &str,
) -> ServiceResult<PipelineStep> {
    require("logs", logs)?;

    let mut tx = pool.begin().await?;
    let mut pipeline = lock_pipeline(&mut tx, pipeline_id).await?;
    let step = find_step(&mut pipeline, stage_id, step_id)?;

    step.append_logs(logs, lifecycle::now());

    pipeline_repository::save_step(&mut *tx, step).await?;
    let step = step.clone();
    tx.commit().await?;

    tracing::debug!("Appended {} log lines to step {}", logs.lines().count(), step_id);

    Ok(step)
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn lock_pipeline(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> ServiceResult<Pipeline> {
    pipeline_repository::lock_by_id(&mut **tx, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Pipeline.as_str(), id))
}

fn find_stage(pipeline: &mut Pipeline, stage_id: Uuid) -> ServiceResult<&mut PipelineStage> {
    pipeline
        .stage_mut(stage_id)
        .ok_or_else(|| ServiceError::not_found(EntityKind::PipelineStage.as_str(), stage_id))
}

fn find_step(
    pipeline: &mut Pipeline,
    stage_id: Uuid,
    step_id: Uuid,
) -> ServiceResult<&mut PipelineStep> {
    find_stage(pipeline, stage_id)?
        .step_mut(step_id)
        .ok_or_else(|| ServiceError::not_found(EntityKind::PipelineStep.as_str(), step_id))
}

fn validate_create(req: &CreatePipeline) -> ServiceResult<()> {
    require_bounded("name", &req.name, MAX_NAME_LEN)?;
    for stage in &req.stages {
        require_bounded("stage name", &stage.name, MAX_NAME_LEN)?;
        for step in &stage.steps {
            require_bounded("step name", step, MAX_NAME_LEN)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::dto::pipeline::NewStage;
    use keel_core::lifecycle::RunStatus;

    fn request() -> CreatePipeline {
        CreatePipeline {
            name: "release".to_string(),
            deployment_id: Uuid::new_v4(),
            stages: vec![NewStage {
                name: "build".to_string(),
                steps: vec!["compile".to_string(), "test".to_string()],
            }],
        }
    }

    #[test]
    fn test_validate_create() {
        assert!(validate_create(&request()).is_ok());

        let mut req = request();
        req.stages[0].steps.push("".to_string());
        assert!(matches!(
            validate_create(&req),
            Err(ServiceError::Validation(msg)) if msg.contains("step name")
        ));
    }

    #[test]
    fn test_validate_create_rejects_overlong_names() {
        let mut req = request();
        req.stages[0].name = "s".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_create(&req),
            Err(ServiceError::Validation(msg)) if msg.starts_with("stage name must be at most")
        ));
    }

    #[test]
    fn test_find_step_reports_missing_level() {
        let mut pipeline = request().into_pipeline();
        let stage_id = pipeline.stages[0].id;
        let step_id = pipeline.stages[0].steps[1].id;

        assert_eq!(find_step(&mut pipeline, stage_id, step_id).unwrap().name, "test");

        match find_step(&mut pipeline, Uuid::nil(), step_id) {
            Err(ServiceError::NotFound { kind, .. }) => assert_eq!(kind, "pipeline stage"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.id)),
        }
        match find_step(&mut pipeline, stage_id, Uuid::nil()) {
            Err(ServiceError::NotFound { kind, .. }) => assert_eq!(kind, "pipeline step"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.id)),
        }
    }

    #[test]
    fn test_propagate_on_stage_fail_cancels_open_steps() {
        let mut pipeline = request().into_pipeline();
        let stage = &mut pipeline.stages[0];
        let at = lifecycle::now();
        stage.transition_at(Operation::Start, None, at).unwrap();
        stage.steps[0].transition_at(Operation::Start, None, at).unwrap();
        stage.steps[0].transition_at(Operation::Complete, None, at).unwrap();
        stage.transition_at(Operation::Fail, Some("flaky"), at).unwrap();

        assert!(cascades(CascadePolicy::Propagate, Operation::Fail));
        assert_eq!(stage.cancel_open_steps(at), 1);
        assert_eq!(stage.steps[0].status(), RunStatus::Completed);
        assert_eq!(stage.steps[1].status(), RunStatus::Cancelled);
    }
}
