//! Pipeline API Handlers
//!
//! HTTP endpoints for pipelines, stages and steps.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use keel_core::domain::pipeline::{Pipeline, PipelineStage, PipelineStep};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::dto::pipeline::{AppendLogs, CreatePipeline, PipelineSummary};
use keel_core::lifecycle::Operation;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::deployment::RecentQuery;
use crate::api::error::ApiResult;
use crate::api::extract::{Json, Path, Query};
use crate::api::{AppState, fail_request, parse_param};
use crate::repository::pipeline::PipelineFilter;
use crate::service::pipeline_service;

// =============================================================================
// Pipeline Endpoints
// =============================================================================

/// POST /api/pipelines
/// Create a pipeline with its stages and steps
pub async fn create_pipeline(
    State(pool): State<PgPool>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {} for deployment {}", req.name, req.deployment_id);

    let pipeline = pipeline_service::create_pipeline(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /api/pipelines
/// List pipelines, optionally filtered by status and deployment
pub async fn list_pipelines(
    State(pool): State<PgPool>,
    Query(params): Query<ListPipelinesQuery>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    let filter = PipelineFilter {
        status: parse_param(params.status.as_deref())?,
        deployment_id: params.deployment_id,
    };

    let pipelines = pipeline_service::list_pipelines(&pool, filter).await?;
    Ok(Json(pipelines))
}

#[derive(Debug, Deserialize)]
pub struct ListPipelinesQuery {
    pub status: Option<String>,
    pub deployment_id: Option<Uuid>,
}

/// GET /api/pipelines/recent
pub async fn recent_pipelines(
    State(pool): State<PgPool>,
    Query(params): Query<RecentQuery>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    Ok(Json(pipeline_service::recent_pipelines(&pool, params.limit).await?))
}

/// GET /api/pipelines/long-running
/// IN_PROGRESS pipelines started more than `minutes` ago (default 60)
pub async fn long_running_pipelines(
    State(pool): State<PgPool>,
    Query(params): Query<LongRunningQuery>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    Ok(Json(
        pipeline_service::long_running_pipelines(&pool, params.minutes).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LongRunningQuery {
    pub minutes: Option<i64>,
}

/// GET /api/pipelines/stats
pub async fn pipeline_stats(State(pool): State<PgPool>) -> ApiResult<Json<StatusStats>> {
    Ok(Json(pipeline_service::pipeline_stats(&pool).await?))
}

/// GET /api/pipelines/{id}
pub async fn get_pipeline(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    Ok(Json(pipeline_service::get_pipeline(&pool, id).await?))
}

/// DELETE /api/pipelines/{id}
pub async fn delete_pipeline(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    pipeline_service::delete_pipeline(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/pipelines/{id}/{operation}
pub async fn transition_pipeline(
    State(state): State<AppState>,
    Path((id, operation)): Path<(Uuid, Operation)>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Pipeline {}: {}", id, operation);

    let pipeline =
        pipeline_service::transition_pipeline(&state.pool, state.cascade, id, operation, None)
            .await?;
    Ok(Json(pipeline))
}

/// POST /api/pipelines/{id}/fail
pub async fn fail_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Pipeline>> {
    let req = fail_request(&body)?;
    tracing::info!("Pipeline {}: fail", id);

    let pipeline = pipeline_service::transition_pipeline(
        &state.pool,
        state.cascade,
        id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(pipeline))
}

// =============================================================================
// Stage Endpoints
// =============================================================================

/// POST /api/pipelines/{id}/stages/{stage_id}/{operation}
pub async fn transition_stage(
    State(state): State<AppState>,
    Path((id, stage_id, operation)): Path<(Uuid, Uuid, Operation)>,
) -> ApiResult<Json<PipelineStage>> {
    tracing::info!("Stage {} of pipeline {}: {}", stage_id, id, operation);

    let stage = pipeline_service::transition_stage(
        &state.pool,
        state.cascade,
        id,
        stage_id,
        operation,
        None,
    )
    .await?;
    Ok(Json(stage))
}

/// POST /api/pipelines/{id}/stages/{stage_id}/fail
pub async fn fail_stage(
    State(state): State<AppState>,
    Path((id, stage_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> ApiResult<Json<PipelineStage>> {
    let req = fail_request(&body)?;
    tracing::info!("Stage {} of pipeline {}: fail", stage_id, id);

    let stage = pipeline_service::transition_stage(
        &state.pool,
        state.cascade,
        id,
        stage_id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(stage))
}

// =============================================================================
// Step Endpoints
// =============================================================================

/// POST /api/pipelines/{id}/stages/{stage_id}/steps/{step_id}/{operation}
pub async fn transition_step(
    State(pool): State<PgPool>,
    Path((id, stage_id, step_id, operation)): Path<(Uuid, Uuid, Uuid, Operation)>,
) -> ApiResult<Json<PipelineStep>> {
    tracing::info!("Step {} of stage {}: {}", step_id, stage_id, operation);

    let step =
        pipeline_service::transition_step(&pool, id, stage_id, step_id, operation, None).await?;
    Ok(Json(step))
}

/// POST /api/pipelines/{id}/stages/{stage_id}/steps/{step_id}/fail
/// Fail a step; the reason is also appended to its logs
pub async fn fail_step(
    State(pool): State<PgPool>,
    Path((id, stage_id, step_id)): Path<(Uuid, Uuid, Uuid)>,
    body: Bytes,
) -> ApiResult<Json<PipelineStep>> {
    let req = fail_request(&body)?;
    tracing::info!("Step {} of stage {}: fail", step_id, stage_id);

    let step = pipeline_service::transition_step(
        &pool,
        id,
        stage_id,
        step_id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(step))
}

/// POST /api/pipelines/{id}/stages/{stage_id}/steps/{step_id}/logs
/// Append log lines to a step
pub async fn append_step_logs(
    State(pool): State<PgPool>,
    Path((id, stage_id, step_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(req): Json<AppendLogs>,
) -> ApiResult<Json<PipelineStep>> {
    tracing::debug!("Appending logs to step {}", step_id);

    let step = pipeline_service::append_step_logs(&pool, id, stage_id, step_id, &req.logs).await?;
    Ok(Json(step))
}
