//! Infrastructure Repository
//!
//! Handles all database operations related to infrastructure records.

use chrono::{DateTime, Utc};
use keel_core::domain::environment::Environment;
use keel_core::domain::infrastructure::{Infrastructure, InfrastructureType};
use keel_core::lifecycle::{InfrastructureStatus, Lifecycle};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{decode_counts, decode_name};

const INFRASTRUCTURE_COLUMNS: &str =
    "id, name, type, environment, resources, created_at, updated_at, status, error_message";

/// Optional filters for listing infrastructure
#[derive(Debug, Clone, Copy, Default)]
pub struct InfrastructureFilter {
    pub environment: Option<Environment>,
    pub infra_type: Option<InfrastructureType>,
    pub status: Option<InfrastructureStatus>,
}

/// Insert a new infrastructure record
pub async fn insert(pool: &PgPool, infra: &Infrastructure) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO infrastructure (id, name, type, environment, resources,
                                    created_at, updated_at, status, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(infra.id)
    .bind(&infra.name)
    .bind(infra.infra_type.as_str())
    .bind(infra.environment.as_str())
    .bind(Json(&infra.resources))
    .bind(infra.created_at)
    .bind(infra.updated_at)
    .bind(infra.lifecycle.status().as_str())
    .bind(infra.lifecycle.error_message())
    .execute(pool)
    .await?;

    Ok(())
}

/// Find an infrastructure record by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Infrastructure>, sqlx::Error> {
    let sql = format!("SELECT {INFRASTRUCTURE_COLUMNS} FROM infrastructure WHERE id = $1");

    sqlx::query_as::<_, InfrastructureRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Infrastructure::try_from)
        .transpose()
}

/// Find an infrastructure record by ID and hold its row lock
pub async fn lock_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Infrastructure>, sqlx::Error> {
    let sql =
        format!("SELECT {INFRASTRUCTURE_COLUMNS} FROM infrastructure WHERE id = $1 FOR UPDATE");

    sqlx::query_as::<_, InfrastructureRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Infrastructure::try_from)
        .transpose()
}

/// List infrastructure records, newest first
pub async fn list(
    pool: &PgPool,
    filter: InfrastructureFilter,
) -> Result<Vec<Infrastructure>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {INFRASTRUCTURE_COLUMNS}
        FROM infrastructure
        WHERE ($1::text IS NULL OR environment = $1)
          AND ($2::text IS NULL OR type = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY created_at DESC
        "#
    );

    sqlx::query_as::<_, InfrastructureRow>(&sql)
        .bind(filter.environment.map(Environment::as_str))
        .bind(filter.infra_type.map(InfrastructureType::as_str))
        .bind(filter.status.map(InfrastructureStatus::as_str))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Infrastructure::try_from)
        .collect()
}

/// Number of infrastructure records per stored status
pub async fn count_by_status(
    pool: &PgPool,
) -> Result<Vec<(InfrastructureStatus, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM infrastructure GROUP BY status")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Number of infrastructure records per environment
pub async fn count_by_environment(pool: &PgPool) -> Result<Vec<(Environment, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT environment, COUNT(*) FROM infrastructure GROUP BY environment")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Number of infrastructure records per platform type
pub async fn count_by_type(
    pool: &PgPool,
) -> Result<Vec<(InfrastructureType, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT type, COUNT(*) FROM infrastructure GROUP BY type")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Write every mutable column of an infrastructure record
pub async fn save(conn: &mut PgConnection, infra: &Infrastructure) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE infrastructure
        SET name = $1, resources = $2, updated_at = $3, status = $4, error_message = $5
        WHERE id = $6
        "#,
    )
    .bind(&infra.name)
    .bind(Json(&infra.resources))
    .bind(infra.updated_at)
    .bind(infra.lifecycle.status().as_str())
    .bind(infra.lifecycle.error_message())
    .bind(infra.id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Delete an infrastructure record by ID
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM infrastructure WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct InfrastructureRow {
    id: Uuid,
    name: String,
    #[sqlx(rename = "type")]
    infra_type: String,
    environment: String,
    resources: Json<HashMap<String, String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: String,
    error_message: Option<String>,
}

impl TryFrom<InfrastructureRow> for Infrastructure {
    type Error = sqlx::Error;

    fn try_from(row: InfrastructureRow) -> Result<Self, Self::Error> {
        Ok(Infrastructure {
            id: row.id,
            name: row.name,
            infra_type: decode_name(&row.infra_type)?,
            environment: decode_name(&row.environment)?,
            resources: row.resources.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            lifecycle: Lifecycle::restore(decode_name(&row.status)?, None, None, row.error_message)
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
        })
    }
}
