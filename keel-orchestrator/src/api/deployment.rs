//! Deployment API Handlers
//!
//! HTTP endpoints for deployments and their components.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use keel_core::domain::deployment::{Deployment, DeploymentComponent};
use keel_core::dto::deployment::{
    CreateDeployment, DeploymentSummary, NewComponent, UpdateDeployment,
};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::Operation;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::extract::{Json, Path, Query};
use crate::api::{AppState, fail_request, parse_param};
use crate::repository::deployment::DeploymentFilter;
use crate::service::deployment_service;

// =============================================================================
// Deployment Endpoints
// =============================================================================

/// POST /api/deployments
/// Create a deployment with optional initial components
pub async fn create_deployment(
    State(pool): State<PgPool>,
    Json(req): Json<CreateDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Creating deployment: {} ({})", req.name, req.environment);

    let deployment = deployment_service::create_deployment(&pool, req).await?;

    Ok((StatusCode::CREATED, Json(deployment)))
}

/// GET /api/deployments
/// List deployments, optionally filtered by status and environment
pub async fn list_deployments(
    State(pool): State<PgPool>,
    Query(params): Query<ListDeploymentsQuery>,
) -> ApiResult<Json<Vec<DeploymentSummary>>> {
    let filter = DeploymentFilter {
        status: parse_param(params.status.as_deref())?,
        environment: parse_param(params.environment.as_deref())?,
    };
    tracing::debug!("Listing deployments: {:?}", filter);

    let deployments = deployment_service::list_deployments(&pool, filter).await?;
    Ok(Json(deployments))
}

#[derive(Debug, Deserialize)]
pub struct ListDeploymentsQuery {
    pub status: Option<String>,
    pub environment: Option<String>,
}

/// GET /api/deployments/recent
pub async fn recent_deployments(
    State(pool): State<PgPool>,
    Query(params): Query<RecentQuery>,
) -> ApiResult<Json<Vec<DeploymentSummary>>> {
    let deployments = deployment_service::recent_deployments(&pool, params.limit).await?;
    Ok(Json(deployments))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// GET /api/deployments/stats
pub async fn deployment_stats(State(pool): State<PgPool>) -> ApiResult<Json<StatusStats>> {
    Ok(Json(deployment_service::deployment_stats(&pool).await?))
}

/// GET /api/deployments/{id}
pub async fn get_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    let deployment = deployment_service::get_deployment(&pool, id).await?;
    Ok(Json(deployment))
}

/// PUT /api/deployments/{id}
/// Edit descriptive fields; status changes only through operations
pub async fn update_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDeployment>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::update_deployment(&pool, id, req).await?;
    Ok(Json(deployment))
}

/// DELETE /api/deployments/{id}
pub async fn delete_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting deployment: {}", id);

    deployment_service::delete_deployment(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/deployments/{id}/{operation}
/// Apply `start`, `complete` or `cancel`
pub async fn transition_deployment(
    State(state): State<AppState>,
    Path((id, operation)): Path<(Uuid, Operation)>,
) -> ApiResult<Json<Deployment>> {
    tracing::info!("Deployment {}: {}", id, operation);

    let deployment =
        deployment_service::transition_deployment(&state.pool, state.cascade, id, operation, None)
            .await?;
    Ok(Json(deployment))
}

/// POST /api/deployments/{id}/fail
/// Fail a deployment with an optional reason
pub async fn fail_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Deployment>> {
    let req = fail_request(&body)?;
    tracing::info!("Deployment {}: fail", id);

    let deployment = deployment_service::transition_deployment(
        &state.pool,
        state.cascade,
        id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(deployment))
}

// =============================================================================
// Component Endpoints
// =============================================================================

/// POST /api/deployments/{id}/components
/// Add a component to a deployment
pub async fn add_component(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<NewComponent>,
) -> ApiResult<(StatusCode, Json<DeploymentComponent>)> {
    let component = deployment_service::add_component(&pool, id, req).await?;
    Ok((StatusCode::CREATED, Json(component)))
}

/// POST /api/deployments/{id}/components/{component_id}/{operation}
pub async fn transition_component(
    State(pool): State<PgPool>,
    Path((id, component_id, operation)): Path<(Uuid, Uuid, Operation)>,
) -> ApiResult<Json<DeploymentComponent>> {
    tracing::info!("Component {} of deployment {}: {}", component_id, id, operation);

    let component =
        deployment_service::transition_component(&pool, id, component_id, operation, None).await?;
    Ok(Json(component))
}

/// POST /api/deployments/{id}/components/{component_id}/fail
pub async fn fail_component(
    State(pool): State<PgPool>,
    Path((id, component_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> ApiResult<Json<DeploymentComponent>> {
    let req = fail_request(&body)?;
    tracing::info!("Component {} of deployment {}: fail", component_id, id);

    let component = deployment_service::transition_component(
        &pool,
        id,
        component_id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(component))
}
