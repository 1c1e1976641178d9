//! Configuration Repository
//!
//! Handles all database operations related to configurations.

use chrono::{DateTime, Utc};
use keel_core::domain::configuration::Configuration;
use keel_core::domain::environment::Environment;
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use super::{decode_counts, decode_name};

const CONFIGURATION_COLUMNS: &str =
    "id, name, environment, version, data, secrets, created_by, created_at, updated_at";

/// Insert a new configuration version
pub async fn insert(pool: &PgPool, config: &Configuration) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO configurations (id, name, environment, version, data, secrets,
                                    created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(config.id)
    .bind(&config.name)
    .bind(config.environment.as_str())
    .bind(&config.version)
    .bind(Json(&config.data))
    .bind(Json(&config.secrets))
    .bind(&config.created_by)
    .bind(config.created_at)
    .bind(config.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a configuration by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Configuration>, sqlx::Error> {
    let sql = format!("SELECT {CONFIGURATION_COLUMNS} FROM configurations WHERE id = $1");

    sqlx::query_as::<_, ConfigurationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Configuration::try_from)
        .transpose()
}

/// Most recently created version of (name, environment)
pub async fn find_latest(
    pool: &PgPool,
    name: &str,
    environment: Environment,
) -> Result<Option<Configuration>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {CONFIGURATION_COLUMNS}
        FROM configurations
        WHERE name = $1 AND environment = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#
    );

    sqlx::query_as::<_, ConfigurationRow>(&sql)
        .bind(name)
        .bind(environment.as_str())
        .fetch_optional(pool)
        .await?
        .map(Configuration::try_from)
        .transpose()
}

/// One specific version of (name, environment)
pub async fn find_version(
    pool: &PgPool,
    name: &str,
    environment: Environment,
    version: &str,
) -> Result<Option<Configuration>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {CONFIGURATION_COLUMNS}
        FROM configurations
        WHERE name = $1 AND environment = $2 AND version = $3
        "#
    );

    sqlx::query_as::<_, ConfigurationRow>(&sql)
        .bind(name)
        .bind(environment.as_str())
        .bind(version)
        .fetch_optional(pool)
        .await?
        .map(Configuration::try_from)
        .transpose()
}

/// List configurations, optionally for one environment
pub async fn list(
    pool: &PgPool,
    environment: Option<Environment>,
) -> Result<Vec<Configuration>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {CONFIGURATION_COLUMNS}
        FROM configurations
        WHERE ($1::text IS NULL OR environment = $1)
        ORDER BY name, created_at DESC
        "#
    );

    sqlx::query_as::<_, ConfigurationRow>(&sql)
        .bind(environment.map(Environment::as_str))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Configuration::try_from)
        .collect()
}

/// Merge data and secret references into a stored configuration
///
/// The merge happens in one statement so concurrent patches never drop each
/// other's keys.
pub async fn merge_entries(
    pool: &PgPool,
    id: Uuid,
    data: &HashMap<String, String>,
    secrets: &HashMap<String, String>,
    at: DateTime<Utc>,
) -> Result<Option<Configuration>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE configurations
        SET data = data || $1, secrets = secrets || $2, updated_at = $3
        WHERE id = $4
        RETURNING {CONFIGURATION_COLUMNS}
        "#
    );

    sqlx::query_as::<_, ConfigurationRow>(&sql)
        .bind(Json(data))
        .bind(Json(secrets))
        .bind(at)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Configuration::try_from)
        .transpose()
}

/// Delete a configuration by ID
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM configurations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete every version of (name, environment), returning how many went
pub async fn delete_all_versions(
    pool: &PgPool,
    name: &str,
    environment: Environment,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM configurations WHERE name = $1 AND environment = $2")
        .bind(name)
        .bind(environment.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Number of configuration versions per environment
pub async fn count_by_environment(pool: &PgPool) -> Result<Vec<(Environment, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT environment, COUNT(*) FROM configurations GROUP BY environment")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ConfigurationRow {
    id: Uuid,
    name: String,
    environment: String,
    version: String,
    data: Json<HashMap<String, String>>,
    secrets: Json<HashMap<String, String>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConfigurationRow> for Configuration {
    type Error = sqlx::Error;

    fn try_from(row: ConfigurationRow) -> Result<Self, Self::Error> {
        Ok(Configuration {
            id: row.id,
            name: row.name,
            environment: decode_name(&row.environment)?,
            version: row.version,
            data: row.data.0,
            secrets: row.secrets.0,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
