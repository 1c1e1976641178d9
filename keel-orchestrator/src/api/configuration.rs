//! Configuration API Handlers

use axum::{extract::State, http::StatusCode};
use keel_core::domain::configuration::Configuration;
use keel_core::domain::environment::Environment;
use keel_core::dto::configuration::{
    ConfigurationStats, CreateConfiguration, NewVersion, PatchConfiguration,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{Json, Path, Query};
use crate::api::parse_param;
use crate::service::configuration_service;

/// POST /api/configurations
pub async fn create_configuration(
    State(pool): State<PgPool>,
    Json(req): Json<CreateConfiguration>,
) -> ApiResult<(StatusCode, Json<Configuration>)> {
    tracing::info!(
        "Creating configuration: {} {} v{}",
        req.name,
        req.environment,
        req.version.as_deref().unwrap_or("(initial)")
    );

    let config = configuration_service::create_configuration(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// GET /api/configurations
pub async fn list_configurations(
    State(pool): State<PgPool>,
    Query(params): Query<ListConfigurationsQuery>,
) -> ApiResult<Json<Vec<Configuration>>> {
    let environment = parse_param(params.environment.as_deref())?;
    Ok(Json(
        configuration_service::list_configurations(&pool, environment).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListConfigurationsQuery {
    pub environment: Option<String>,
}

/// DELETE /api/configurations?name=..&environment=..
/// Delete every version of a configuration in one environment
pub async fn delete_configurations(
    State(pool): State<PgPool>,
    Query(params): Query<ConfigurationKeyQuery>,
) -> ApiResult<StatusCode> {
    let (name, environment) = params.key()?;
    tracing::info!("Deleting all versions of configuration {} {}", name, environment);

    configuration_service::delete_all_versions(&pool, &name, environment).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/configurations/stats
pub async fn configuration_stats(
    State(pool): State<PgPool>,
) -> ApiResult<Json<ConfigurationStats>> {
    Ok(Json(configuration_service::configuration_stats(&pool).await?))
}

/// GET /api/configurations/latest?name=..&environment=..
/// Most recently created version of a configuration
pub async fn latest_configuration(
    State(pool): State<PgPool>,
    Query(params): Query<ConfigurationKeyQuery>,
) -> ApiResult<Json<Configuration>> {
    let (name, environment) = params.key()?;

    let config = configuration_service::latest_configuration(&pool, &name, environment).await?;
    Ok(Json(config))
}

/// GET /api/configurations/version?name=..&environment=..&version=..
/// One specific version of a configuration
pub async fn configuration_version(
    State(pool): State<PgPool>,
    Query(params): Query<ConfigurationKeyQuery>,
) -> ApiResult<Json<Configuration>> {
    let version = params
        .version
        .clone()
        .ok_or_else(|| ApiError::BadRequest("version is required".to_string()))?;
    let (name, environment) = params.key()?;

    let config =
        configuration_service::configuration_version(&pool, &name, environment, &version).await?;
    Ok(Json(config))
}

/// Identifies a configuration by name and environment in the query string
#[derive(Debug, Deserialize)]
pub struct ConfigurationKeyQuery {
    pub name: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
}

impl ConfigurationKeyQuery {
    fn key(self) -> ApiResult<(String, Environment)> {
        let environment: Environment = parse_param(self.environment.as_deref())?
            .ok_or_else(|| ApiError::BadRequest("environment is required".to_string()))?;
        Ok((self.name.unwrap_or_default(), environment))
    }
}

/// GET /api/configurations/{id}
pub async fn get_configuration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Configuration>> {
    Ok(Json(configuration_service::get_configuration(&pool, id).await?))
}

/// DELETE /api/configurations/{id}
pub async fn delete_configuration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting configuration: {}", id);

    configuration_service::delete_configuration(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/configurations/{id}/data
/// Merge data entries and secret references into the configuration
pub async fn patch_configuration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchConfiguration>,
) -> ApiResult<Json<Configuration>> {
    Ok(Json(
        configuration_service::patch_configuration(&pool, id, req).await?,
    ))
}

/// POST /api/configurations/{id}/versions
/// Derive a new version from an existing one
pub async fn new_configuration_version(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<NewVersion>,
) -> ApiResult<(StatusCode, Json<Configuration>)> {
    tracing::info!(
        "New version {} of configuration {}",
        req.version.as_deref().unwrap_or("(next patch)"),
        id
    );

    let config = configuration_service::new_configuration_version(&pool, id, req).await?;
    Ok((StatusCode::CREATED, Json(config)))
}
