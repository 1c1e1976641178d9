//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Aggregate loads and writes take a `&mut PgConnection` so the same code runs
//! on a pooled connection or inside a transaction holding the root row lock.

pub mod configuration;
pub mod deployment;
pub mod infrastructure;
pub mod pipeline;

// Re-export for convenience
pub use configuration as configuration_repository;
pub use deployment as deployment_repository;
pub use infrastructure as infrastructure_repository;
pub use pipeline as pipeline_repository;

use chrono::{DateTime, Utc};
use keel_core::UnknownName;
use keel_core::lifecycle::{Lifecycle, LifecycleStatus, RunStatus};
use sqlx::PgConnection;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Shared Lifecycle Columns
// =============================================================================

/// Tables whose rows carry the run lifecycle columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunTable {
    Deployments,
    DeploymentComponents,
    Pipelines,
    PipelineStages,
    PipelineSteps,
}

impl RunTable {
    fn name(self) -> &'static str {
        match self {
            RunTable::Deployments => "deployments",
            RunTable::DeploymentComponents => "deployment_components",
            RunTable::Pipelines => "pipelines",
            RunTable::PipelineStages => "pipeline_stages",
            RunTable::PipelineSteps => "pipeline_steps",
        }
    }
}

/// Write the lifecycle columns of one row
pub(crate) async fn save_run_lifecycle(
    conn: &mut PgConnection,
    table: RunTable,
    id: Uuid,
    lifecycle: &Lifecycle<RunStatus>,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET status = $1, started_at = $2, completed_at = $3, error_message = $4 WHERE id = $5",
        table.name()
    );

    sqlx::query(&sql)
        .bind(lifecycle.status().as_str())
        .bind(lifecycle.started_at())
        .bind(lifecycle.completed_at())
        .bind(lifecycle.error_message())
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Lifecycle columns as stored
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LifecycleColumns {
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl LifecycleColumns {
    pub fn restore<S: LifecycleStatus>(self) -> Result<Lifecycle<S>, sqlx::Error> {
        Lifecycle::restore(
            decode_name(&self.status)?,
            self.started_at,
            self.completed_at,
            self.error_message,
        )
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
    }
}

/// Parse a stored wire name; an unknown name is a decode error
pub(crate) fn decode_name<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = UnknownName>,
{
    raw.parse()
        .map_err(|err: UnknownName| sqlx::Error::Decode(Box::new(err)))
}

/// Parse `(name, count)` rows from a `GROUP BY` query over a wire-name column
pub(crate) fn decode_counts<T>(rows: Vec<(String, i64)>) -> Result<Vec<(T, i64)>, sqlx::Error>
where
    T: FromStr<Err = UnknownName>,
{
    rows.into_iter()
        .map(|(status, count)| Ok((decode_name(&status)?, count)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::environment::Environment;
    use keel_core::lifecycle::InfrastructureStatus;

    #[test]
    fn test_unknown_stored_status_is_decode_error() {
        let columns = LifecycleColumns {
            status: "PAUSED".to_string(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        let err = columns.restore::<RunStatus>().unwrap_err();
        assert!(matches!(err, sqlx::Error::Decode(_)));
    }

    #[test]
    fn test_restore_keeps_stored_fields() {
        let started = keel_core::lifecycle::now();
        let columns = LifecycleColumns {
            status: "IN_PROGRESS".to_string(),
            started_at: Some(started),
            completed_at: None,
            error_message: None,
        };
        let lifecycle = columns.restore::<RunStatus>().unwrap();
        assert_eq!(lifecycle.status(), RunStatus::InProgress);
        assert_eq!(lifecycle.started_at(), Some(started));
    }

    #[test]
    fn test_restore_rejects_completion_before_start() {
        let started = keel_core::lifecycle::now();
        let columns = LifecycleColumns {
            status: "COMPLETED".to_string(),
            started_at: Some(started),
            completed_at: Some(started - chrono::TimeDelta::seconds(1)),
            error_message: None,
        };
        let err = columns.restore::<RunStatus>().unwrap_err();
        assert!(matches!(err, sqlx::Error::Decode(_)));
    }

    #[test]
    fn test_decode_counts() {
        let counts = decode_counts::<InfrastructureStatus>(vec![
            ("ACTIVE".to_string(), 2),
            ("FAILED".to_string(), 1),
        ])
        .unwrap();
        assert_eq!(counts[0], (InfrastructureStatus::Active, 2));
        assert!(decode_counts::<InfrastructureStatus>(vec![("GONE".to_string(), 1)]).is_err());
    }

    #[test]
    fn test_decode_environment_counts() {
        let counts = decode_counts::<Environment>(vec![("STAGING".to_string(), 4)]).unwrap();
        assert_eq!(counts, vec![(Environment::Staging, 4)]);
    }
}
