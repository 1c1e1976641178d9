//! Infrastructure Service
//!
//! Business logic for infrastructure records.

use keel_core::domain::infrastructure::Infrastructure;
use keel_core::dto::infrastructure::{CreateInfrastructure, UpdateInfrastructure};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::{self, EntityKind, Operation, Stateful};
use sqlx::PgPool;
use uuid::Uuid;

use super::{MAX_NAME_LEN, ServiceError, ServiceResult, require_bounded};
use crate::repository::infrastructure::InfrastructureFilter;
use crate::repository::infrastructure_repository;

/// Register new infrastructure in PROVISIONING
pub async fn create_infrastructure(
    pool: &PgPool,
    req: CreateInfrastructure,
) -> ServiceResult<Infrastructure> {
    require_bounded("name", &req.name, MAX_NAME_LEN)?;

    let mut infra = Infrastructure::new(req.name, req.infra_type, req.environment);
    infra.resources = req.resources;

    infrastructure_repository::insert(pool, &infra).await?;

    tracing::info!(
        "Infrastructure created: {} ({}, {} in {})",
        infra.id,
        infra.name,
        infra.infra_type,
        infra.environment
    );

    Ok(infra)
}

/// Get an infrastructure record by ID
pub async fn get_infrastructure(pool: &PgPool, id: Uuid) -> ServiceResult<Infrastructure> {
    infrastructure_repository::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Infrastructure.as_str(), id))
}

/// List infrastructure matching the filter
pub async fn list_infrastructure(
    pool: &PgPool,
    filter: InfrastructureFilter,
) -> ServiceResult<Vec<Infrastructure>> {
    Ok(infrastructure_repository::list(pool, filter).await?)
}

/// Number of infrastructure records per status, environment and type
pub async fn infrastructure_stats(pool: &PgPool) -> ServiceResult<StatusStats> {
    let statuses = infrastructure_repository::count_by_status(pool).await?;
    let environments = infrastructure_repository::count_by_environment(pool).await?;
    let types = infrastructure_repository::count_by_type(pool).await?;
    Ok(StatusStats::from_counts(statuses)
        .with_environments(environments)
        .with_types(types))
}

/// Edit name and resources; status only moves through transitions
pub async fn update_infrastructure(
    pool: &PgPool,
    id: Uuid,
    req: UpdateInfrastructure,
) -> ServiceResult<Infrastructure> {
    let mut tx = pool.begin().await?;
    let mut infra = infrastructure_repository::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Infrastructure.as_str(), id))?;

    apply_update(&mut infra, req)?;

    infrastructure_repository::save(&mut *tx, &infra).await?;
    tx.commit().await?;

    tracing::info!("Infrastructure {} updated", id);

    Ok(infra)
}

/// Remove an infrastructure record
pub async fn remove_infrastructure(pool: &PgPool, id: Uuid) -> ServiceResult<()> {
    if !infrastructure_repository::delete(pool, id).await? {
        return Err(ServiceError::not_found(EntityKind::Infrastructure.as_str(), id));
    }

    tracing::info!("Infrastructure {} removed", id);
    Ok(())
}

/// Apply a lifecycle operation to an infrastructure record
pub async fn transition_infrastructure(
    pool: &PgPool,
    id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<Infrastructure> {
    let mut tx = pool.begin().await?;
    let mut infra = infrastructure_repository::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Infrastructure.as_str(), id))?;

    infra.transition(operation, reason)?;

    infrastructure_repository::save(&mut *tx, &infra).await?;
    tx.commit().await?;

    tracing::info!("Infrastructure {} {} -> {}", id, operation, infra.status());

    Ok(infra)
}

fn apply_update(infra: &mut Infrastructure, req: UpdateInfrastructure) -> ServiceResult<()> {
    if let Some(name) = req.name {
        require_bounded("name", &name, MAX_NAME_LEN)?;
        infra.name = name;
    }
    if let Some(resources) = req.resources {
        infra.resources = resources;
    }
    infra.updated_at = lifecycle::now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::environment::Environment;
    use keel_core::domain::infrastructure::InfrastructureType;
    use keel_core::lifecycle::InfrastructureStatus;
    use std::collections::HashMap;

    #[test]
    fn test_apply_update_replaces_resources() {
        let mut infra = Infrastructure::new("cluster", InfrastructureType::Kubernetes, Environment::Dev);
        infra.add_resource("nodes", "3");
        let touched = infra.updated_at;

        apply_update(
            &mut infra,
            UpdateInfrastructure {
                name: None,
                resources: Some(HashMap::from([("nodes".to_string(), "5".to_string())])),
            },
        )
        .unwrap();

        assert_eq!(infra.name, "cluster");
        assert_eq!(infra.resources["nodes"], "5");
        assert!(infra.updated_at >= touched);
        assert_eq!(infra.status(), InfrastructureStatus::Provisioning);
    }

    #[test]
    fn test_apply_update_rejects_blank_name() {
        let mut infra = Infrastructure::new("vm", InfrastructureType::Vm, Environment::Dev);
        let req = UpdateInfrastructure {
            name: Some(String::new()),
            resources: None,
        };
        assert!(matches!(
            apply_update(&mut infra, req),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_apply_update_rejects_overlong_name() {
        let mut infra = Infrastructure::new("vm", InfrastructureType::Vm, Environment::Dev);
        let req = UpdateInfrastructure {
            name: Some("v".repeat(MAX_NAME_LEN + 1)),
            resources: None,
        };
        assert!(apply_update(&mut infra, req).is_err());
        assert_eq!(infra.name, "vm");
    }
}
