//! Infrastructure API Handlers

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use keel_core::domain::infrastructure::Infrastructure;
use keel_core::dto::infrastructure::{CreateInfrastructure, UpdateInfrastructure};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::Operation;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::extract::{Json, Path, Query};
use crate::api::{fail_request, parse_param};
use crate::repository::infrastructure::InfrastructureFilter;
use crate::service::infrastructure_service;

/// POST /api/infrastructure
/// Register infrastructure; it starts out PROVISIONING
pub async fn create_infrastructure(
    State(pool): State<PgPool>,
    Json(req): Json<CreateInfrastructure>,
) -> ApiResult<(StatusCode, Json<Infrastructure>)> {
    tracing::info!("Creating infrastructure: {} ({})", req.name, req.infra_type);

    let infra = infrastructure_service::create_infrastructure(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(infra)))
}

/// GET /api/infrastructure
/// List infrastructure filtered by environment, type and status
pub async fn list_infrastructure(
    State(pool): State<PgPool>,
    Query(params): Query<ListInfrastructureQuery>,
) -> ApiResult<Json<Vec<Infrastructure>>> {
    let filter = InfrastructureFilter {
        environment: parse_param(params.environment.as_deref())?,
        infra_type: parse_param(params.infra_type.as_deref())?,
        status: parse_param(params.status.as_deref())?,
    };
    tracing::debug!("Listing infrastructure: {:?}", filter);

    Ok(Json(infrastructure_service::list_infrastructure(&pool, filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListInfrastructureQuery {
    pub environment: Option<String>,
    #[serde(rename = "type")]
    pub infra_type: Option<String>,
    pub status: Option<String>,
}

/// GET /api/infrastructure/stats
pub async fn infrastructure_stats(State(pool): State<PgPool>) -> ApiResult<Json<StatusStats>> {
    Ok(Json(infrastructure_service::infrastructure_stats(&pool).await?))
}

/// GET /api/infrastructure/{id}
pub async fn get_infrastructure(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Infrastructure>> {
    Ok(Json(infrastructure_service::get_infrastructure(&pool, id).await?))
}

/// PUT /api/infrastructure/{id}
/// Rename or replace resources; status is untouched
pub async fn update_infrastructure(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInfrastructure>,
) -> ApiResult<Json<Infrastructure>> {
    Ok(Json(
        infrastructure_service::update_infrastructure(&pool, id, req).await?,
    ))
}

/// DELETE /api/infrastructure/{id}
/// Remove the record outright
pub async fn remove_infrastructure(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Removing infrastructure: {}", id);

    infrastructure_service::remove_infrastructure(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/infrastructure/{id}/{operation}
/// Apply `activate`, `update` or `delete`
pub async fn transition_infrastructure(
    State(pool): State<PgPool>,
    Path((id, operation)): Path<(Uuid, Operation)>,
) -> ApiResult<Json<Infrastructure>> {
    tracing::info!("Infrastructure {}: {}", id, operation);

    let infra =
        infrastructure_service::transition_infrastructure(&pool, id, operation, None).await?;
    Ok(Json(infra))
}

/// POST /api/infrastructure/{id}/fail
pub async fn fail_infrastructure(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Infrastructure>> {
    let req = fail_request(&body)?;
    tracing::info!("Infrastructure {}: fail", id);

    let infra = infrastructure_service::transition_infrastructure(
        &pool,
        id,
        Operation::Fail,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(infra))
}
