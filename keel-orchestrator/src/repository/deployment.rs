//! Deployment Repository
//!
//! Handles all database operations related to deployments and their components.

use chrono::{DateTime, Utc};
use keel_core::domain::deployment::{Deployment, DeploymentComponent};
use keel_core::domain::environment::Environment;
use keel_core::lifecycle::RunStatus;
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{LifecycleColumns, RunTable, decode_counts, decode_name, save_run_lifecycle};

const DEPLOYMENT_COLUMNS: &str = "id, name, description, environment, strategy, created_by, \
     created_at, metadata, status, started_at, completed_at, error_message";

const COMPONENT_COLUMNS: &str =
    "id, deployment_id, name, version, created_at, status, started_at, completed_at, error_message";

/// Optional filters for listing deployments
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentFilter {
    pub status: Option<RunStatus>,
    pub environment: Option<Environment>,
}

/// Insert a deployment together with its components
pub async fn insert(conn: &mut PgConnection, deployment: &Deployment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO deployments (id, name, description, environment, strategy, created_by,
                                 created_at, metadata, status, started_at, completed_at, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(deployment.id)
    .bind(&deployment.name)
    .bind(&deployment.description)
    .bind(deployment.environment.as_str())
    .bind(deployment.strategy.as_str())
    .bind(&deployment.created_by)
    .bind(deployment.created_at)
    .bind(Json(&deployment.metadata))
    .bind(deployment.lifecycle.status().as_str())
    .bind(deployment.lifecycle.started_at())
    .bind(deployment.lifecycle.completed_at())
    .bind(deployment.lifecycle.error_message())
    .execute(&mut *conn)
    .await?;

    for component in &deployment.components {
        insert_component(&mut *conn, component).await?;
    }

    Ok(())
}

/// Insert a single component row
pub async fn insert_component(
    conn: &mut PgConnection,
    component: &DeploymentComponent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO deployment_components (id, deployment_id, name, version, created_at,
                                           status, started_at, completed_at, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(component.id)
    .bind(component.deployment_id)
    .bind(&component.name)
    .bind(&component.version)
    .bind(component.created_at)
    .bind(component.lifecycle.status().as_str())
    .bind(component.lifecycle.started_at())
    .bind(component.lifecycle.completed_at())
    .bind(component.lifecycle.error_message())
    .execute(conn)
    .await?;

    Ok(())
}

/// Find a deployment by ID, components included
pub async fn find_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Deployment>, sqlx::Error> {
    load(conn, id, false).await
}

/// Find a deployment by ID and hold its row lock until the transaction ends
pub async fn lock_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Deployment>, sqlx::Error> {
    load(conn, id, true).await
}

async fn load(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Deployment>, sqlx::Error> {
    let sql = format!(
        "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );

    let Some(row) = sqlx::query_as::<_, DeploymentRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let mut deployment = Deployment::try_from(row)?;
    deployment.components = components_of(&mut *conn, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();

    Ok(Some(deployment))
}

/// Whether a deployment with this ID exists
pub async fn exists(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM deployments WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(found.is_some())
}

/// List deployments, newest first
///
/// `limit` of `None` returns every match.
pub async fn list(
    pool: &PgPool,
    filter: DeploymentFilter,
    limit: Option<i64>,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {DEPLOYMENT_COLUMNS}
        FROM deployments
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR environment = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#
    );

    let rows = sqlx::query_as::<_, DeploymentRow>(&sql)
        .bind(filter.status.map(RunStatus::as_str))
        .bind(filter.environment.map(Environment::as_str))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut components = components_of(pool, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let mut deployment = Deployment::try_from(row)?;
            deployment.components = components.remove(&deployment.id).unwrap_or_default();
            Ok(deployment)
        })
        .collect()
}

/// Number of deployments per stored status
pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(RunStatus, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM deployments GROUP BY status")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Number of deployments per environment
pub async fn count_by_environment(pool: &PgPool) -> Result<Vec<(Environment, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT environment, COUNT(*) FROM deployments GROUP BY environment")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Write the descriptive fields of a deployment
pub async fn save_details(
    conn: &mut PgConnection,
    deployment: &Deployment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE deployments
        SET name = $1, description = $2, strategy = $3, metadata = $4
        WHERE id = $5
        "#,
    )
    .bind(&deployment.name)
    .bind(&deployment.description)
    .bind(deployment.strategy.as_str())
    .bind(Json(&deployment.metadata))
    .bind(deployment.id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Write the lifecycle columns of the deployment and every component
pub async fn save_lifecycles(
    conn: &mut PgConnection,
    deployment: &Deployment,
) -> Result<(), sqlx::Error> {
    save_run_lifecycle(&mut *conn, RunTable::Deployments, deployment.id, &deployment.lifecycle)
        .await?;

    for component in &deployment.components {
        save_component_lifecycle(&mut *conn, component).await?;
    }

    Ok(())
}

pub async fn save_component_lifecycle(
    conn: &mut PgConnection,
    component: &DeploymentComponent,
) -> Result<(), sqlx::Error> {
    save_run_lifecycle(
        conn,
        RunTable::DeploymentComponents,
        component.id,
        &component.lifecycle,
    )
    .await
}

/// Delete a deployment by ID; components go with it
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM deployments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Components of the given deployments keyed by deployment ID, in creation order
async fn components_of<'c>(
    executor: impl PgExecutor<'c>,
    deployment_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<DeploymentComponent>>, sqlx::Error> {
    if deployment_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {COMPONENT_COLUMNS} FROM deployment_components \
         WHERE deployment_id = ANY($1) ORDER BY created_at, id"
    );

    let rows = sqlx::query_as::<_, ComponentRow>(&sql)
        .bind(deployment_ids)
        .fetch_all(executor)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<DeploymentComponent>> = HashMap::new();
    for row in rows {
        let component = DeploymentComponent::try_from(row)?;
        grouped
            .entry(component.deployment_id)
            .or_default()
            .push(component);
    }

    Ok(grouped)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    environment: String,
    strategy: String,
    created_by: String,
    created_at: DateTime<Utc>,
    metadata: Json<HashMap<String, String>>,
    #[sqlx(flatten)]
    lifecycle: LifecycleColumns,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = sqlx::Error;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(Deployment {
            id: row.id,
            name: row.name,
            description: row.description,
            environment: decode_name(&row.environment)?,
            strategy: decode_name(&row.strategy)?,
            created_by: row.created_by,
            created_at: row.created_at,
            metadata: row.metadata.0,
            components: Vec::new(),
            lifecycle: row.lifecycle.restore()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ComponentRow {
    id: Uuid,
    deployment_id: Uuid,
    name: String,
    version: String,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    lifecycle: LifecycleColumns,
}

impl TryFrom<ComponentRow> for DeploymentComponent {
    type Error = sqlx::Error;

    fn try_from(row: ComponentRow) -> Result<Self, Self::Error> {
        Ok(DeploymentComponent {
            id: row.id,
            deployment_id: row.deployment_id,
            name: row.name,
            version: row.version,
            created_at: row.created_at,
            lifecycle: row.lifecycle.restore()?,
        })
    }
}
