//! Deployment Service
//!
//! Business logic for deployments and their components.

use keel_core::domain::deployment::{Deployment, DeploymentComponent};
use keel_core::dto::deployment::{
    CreateDeployment, DeploymentSummary, NewComponent, UpdateDeployment,
};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::{self, CascadePolicy, EntityKind, Operation, Stateful};
use sqlx::PgPool;
use uuid::Uuid;

use super::{MAX_NAME_LEN, ServiceError, ServiceResult, cascades, recent_limit, require_bounded};
use crate::repository::deployment::DeploymentFilter;
use crate::repository::deployment_repository;

/// Create a deployment and its initial components
pub async fn create_deployment(pool: &PgPool, req: CreateDeployment) -> ServiceResult<Deployment> {
    let deployment = build_deployment(req)?;

    let mut tx = pool.begin().await?;
    deployment_repository::insert(&mut *tx, &deployment).await?;
    tx.commit().await?;

    tracing::info!(
        "Deployment created: {} ({}) with {} components",
        deployment.id,
        deployment.name,
        deployment.components.len()
    );

    Ok(deployment)
}

/// Get a deployment by ID
pub async fn get_deployment(pool: &PgPool, id: Uuid) -> ServiceResult<Deployment> {
    let mut conn = pool.acquire().await?;
    deployment_repository::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Deployment.as_str(), id))
}

/// List deployments matching the filter
pub async fn list_deployments(
    pool: &PgPool,
    filter: DeploymentFilter,
) -> ServiceResult<Vec<DeploymentSummary>> {
    let deployments = deployment_repository::list(pool, filter, None).await?;
    Ok(deployments.into_iter().map(DeploymentSummary::from).collect())
}

/// Most recently created deployments
pub async fn recent_deployments(
    pool: &PgPool,
    limit: Option<i64>,
) -> ServiceResult<Vec<DeploymentSummary>> {
    let limit = recent_limit(limit)?;
    let deployments =
        deployment_repository::list(pool, DeploymentFilter::default(), Some(limit)).await?;
    Ok(deployments.into_iter().map(DeploymentSummary::from).collect())
}

/// Number of deployments per status and per environment
pub async fn deployment_stats(pool: &PgPool) -> ServiceResult<StatusStats> {
    let statuses = deployment_repository::count_by_status(pool).await?;
    let environments = deployment_repository::count_by_environment(pool).await?;
    Ok(StatusStats::from_counts(statuses).with_environments(environments))
}

/// Edit the descriptive fields of a deployment
pub async fn update_deployment(
    pool: &PgPool,
    id: Uuid,
    req: UpdateDeployment,
) -> ServiceResult<Deployment> {
    let mut tx = pool.begin().await?;
    let mut deployment = deployment_repository::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Deployment.as_str(), id))?;

    apply_update(&mut deployment, req)?;

    deployment_repository::save_details(&mut *tx, &deployment).await?;
    tx.commit().await?;

    tracing::info!("Deployment {} updated", id);

    Ok(deployment)
}

/// Delete a deployment and everything it owns
pub async fn delete_deployment(pool: &PgPool, id: Uuid) -> ServiceResult<()> {
    if !deployment_repository::delete(pool, id).await? {
        return Err(ServiceError::not_found(EntityKind::Deployment.as_str(), id));
    }

    tracing::info!("Deployment {} deleted", id);
    Ok(())
}

/// Apply a lifecycle operation to a deployment
///
/// Under [`CascadePolicy::Propagate`] a cancel or fail also cancels every
/// component that is still open.
pub async fn transition_deployment(
    pool: &PgPool,
    cascade: CascadePolicy,
    id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<Deployment> {
    let mut tx = pool.begin().await?;
    let mut deployment = deployment_repository::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Deployment.as_str(), id))?;

    let at = lifecycle::now();
    deployment.transition_at(operation, reason, at)?;

    if cascades(cascade, operation) {
        let cancelled = deployment.cancel_open_components(at);
        if cancelled > 0 {
            tracing::info!("Cancelled {} open components of deployment {}", cancelled, id);
        }
    }

    deployment_repository::save_lifecycles(&mut *tx, &deployment).await?;
    tx.commit().await?;

    tracing::info!("Deployment {} {} -> {}", id, operation, deployment.status());

    Ok(deployment)
}

// =============================================================================
// Components
// =============================================================================

/// Add a PENDING component to an existing deployment
pub async fn add_component(
    pool: &PgPool,
    deployment_id: Uuid,
    req: NewComponent,
) -> ServiceResult<DeploymentComponent> {
    validate_component(&req)?;

    let mut tx = pool.begin().await?;
    let mut deployment = deployment_repository::lock_by_id(&mut *tx, deployment_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Deployment.as_str(), deployment_id))?;

    let component = deployment.add_component(req.name, req.version).clone();

    deployment_repository::insert_component(&mut *tx, &component).await?;
    tx.commit().await?;

    tracing::info!(
        "Component {} ({} {}) added to deployment {}",
        component.id,
        component.name,
        component.version,
        deployment_id
    );

    Ok(component)
}

/// Apply a lifecycle operation to one component of a deployment
pub async fn transition_component(
    pool: &PgPool,
    deployment_id: Uuid,
    component_id: Uuid,
    operation: Operation,
    reason: Option<&str>,
) -> ServiceResult<DeploymentComponent> {
    let mut tx = pool.begin().await?;
    let mut deployment = deployment_repository::lock_by_id(&mut *tx, deployment_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Deployment.as_str(), deployment_id))?;

    let component = deployment.component_mut(component_id).ok_or_else(|| {
        ServiceError::not_found(EntityKind::DeploymentComponent.as_str(), component_id)
    })?;

    component.transition(operation, reason)?;

    deployment_repository::save_component_lifecycle(&mut *tx, component).await?;
    let component = component.clone();
    tx.commit().await?;

    tracing::info!(
        "Component {} of deployment {} {} -> {}",
        component_id,
        deployment_id,
        operation,
        component.status()
    );

    Ok(component)
}

// =============================================================================
// Validation
// =============================================================================

fn build_deployment(req: CreateDeployment) -> ServiceResult<Deployment> {
    require_bounded("name", &req.name, MAX_NAME_LEN)?;
    require_bounded("created_by", &req.created_by, MAX_NAME_LEN)?;
    for component in &req.components {
        validate_component(component)?;
    }

    let mut deployment = Deployment::new(
        req.name,
        req.description,
        req.environment,
        req.strategy,
        req.created_by,
    );
    deployment.metadata = req.metadata;
    for component in req.components {
        deployment.add_component(component.name, component.version);
    }

    Ok(deployment)
}

fn validate_component(component: &NewComponent) -> ServiceResult<()> {
    require_bounded("component name", &component.name, MAX_NAME_LEN)?;
    require_bounded("component version", &component.version, MAX_NAME_LEN)
}

fn apply_update(deployment: &mut Deployment, req: UpdateDeployment) -> ServiceResult<()> {
    if let Some(name) = req.name {
        require_bounded("name", &name, MAX_NAME_LEN)?;
        deployment.name = name;
    }
    if let Some(description) = req.description {
        deployment.description = Some(description);
    }
    if let Some(strategy) = req.strategy {
        deployment.strategy = strategy;
    }
    if let Some(metadata) = req.metadata {
        deployment.metadata = metadata;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::deployment::Strategy;
    use keel_core::domain::environment::Environment;
    use keel_core::lifecycle::RunStatus;
    use std::collections::HashMap;

    fn request() -> CreateDeployment {
        CreateDeployment {
            name: "checkout".to_string(),
            description: None,
            environment: Environment::Prod,
            strategy: Strategy::Rolling,
            created_by: "alice".to_string(),
            metadata: HashMap::from([("ticket".to_string(), "OPS-7".to_string())]),
            components: vec![NewComponent {
                name: "api".to_string(),
                version: "1.2.0".to_string(),
            }],
        }
    }

    #[test]
    fn test_build_deployment() {
        let deployment = build_deployment(request()).unwrap();
        assert_eq!(deployment.status(), RunStatus::Pending);
        assert_eq!(deployment.metadata["ticket"], "OPS-7");
        assert_eq!(deployment.components.len(), 1);
        assert_eq!(deployment.components[0].deployment_id, deployment.id);
    }

    #[test]
    fn test_build_deployment_rejects_blank_component_version() {
        let mut req = request();
        req.components[0].version = String::new();
        assert!(matches!(
            build_deployment(req),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_build_deployment_rejects_overlong_fields() {
        let mut req = request();
        req.name = "n".repeat(300);
        assert!(matches!(
            build_deployment(req),
            Err(ServiceError::Validation(msg)) if msg.starts_with("name must be at most 255")
        ));

        let mut req = request();
        req.components[0].name = "c".repeat(256);
        assert!(matches!(
            build_deployment(req),
            Err(ServiceError::Validation(msg)) if msg.starts_with("component name")
        ));
    }

    #[test]
    fn test_apply_update_never_touches_status() {
        let mut deployment = build_deployment(request()).unwrap();
        let before = deployment.lifecycle.clone();
        apply_update(
            &mut deployment,
            UpdateDeployment {
                name: Some("checkout-v2".to_string()),
                strategy: Some(Strategy::Canary),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(deployment.name, "checkout-v2");
        assert_eq!(deployment.strategy, Strategy::Canary);
        assert_eq!(deployment.metadata["ticket"], "OPS-7");
        assert_eq!(deployment.lifecycle, before);
    }

    #[test]
    fn test_apply_update_rejects_blank_name() {
        let mut deployment = build_deployment(request()).unwrap();
        let result = apply_update(
            &mut deployment,
            UpdateDeployment {
                name: Some(" ".to_string()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(deployment.name, "checkout");
    }
}
