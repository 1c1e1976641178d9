//! Pipeline Repository
//!
//! Handles all database operations related to pipelines, stages and steps.

use chrono::{DateTime, Utc};
use keel_core::domain::pipeline::{Pipeline, PipelineStage, PipelineStep};
use keel_core::lifecycle::RunStatus;
use sqlx::{PgConnection, PgExecutor, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{LifecycleColumns, RunTable, decode_counts, save_run_lifecycle};

const PIPELINE_COLUMNS: &str =
    "id, name, deployment_id, created_at, status, started_at, completed_at, error_message";

const STAGE_COLUMNS: &str =
    "id, pipeline_id, name, position, created_at, status, started_at, completed_at, error_message";

const STEP_COLUMNS: &str = "id, stage_id, name, position, created_at, logs, \
     status, started_at, completed_at, error_message";

/// Optional filters for listing pipelines
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineFilter {
    pub status: Option<RunStatus>,
    pub deployment_id: Option<Uuid>,
}

/// Insert a pipeline with all of its stages and steps
pub async fn insert(conn: &mut PgConnection, pipeline: &Pipeline) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pipelines (id, name, deployment_id, created_at,
                               status, started_at, completed_at, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(pipeline.id)
    .bind(&pipeline.name)
    .bind(pipeline.deployment_id)
    .bind(pipeline.created_at)
    .bind(pipeline.lifecycle.status().as_str())
    .bind(pipeline.lifecycle.started_at())
    .bind(pipeline.lifecycle.completed_at())
    .bind(pipeline.lifecycle.error_message())
    .execute(&mut *conn)
    .await?;

    for stage in &pipeline.stages {
        sqlx::query(
            r#"
            INSERT INTO pipeline_stages (id, pipeline_id, name, position, created_at,
                                         status, started_at, completed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stage.id)
        .bind(stage.pipeline_id)
        .bind(&stage.name)
        .bind(stage.position)
        .bind(stage.created_at)
        .bind(stage.lifecycle.status().as_str())
        .bind(stage.lifecycle.started_at())
        .bind(stage.lifecycle.completed_at())
        .bind(stage.lifecycle.error_message())
        .execute(&mut *conn)
        .await?;

        for step in &stage.steps {
            sqlx::query(
                r#"
                INSERT INTO pipeline_steps (id, stage_id, name, position, created_at, logs,
                                            status, started_at, completed_at, error_message)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(step.id)
            .bind(step.stage_id)
            .bind(&step.name)
            .bind(step.position)
            .bind(step.created_at)
            .bind(&step.logs)
            .bind(step.lifecycle.status().as_str())
            .bind(step.lifecycle.started_at())
            .bind(step.lifecycle.completed_at())
            .bind(step.lifecycle.error_message())
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Find a pipeline by ID with its full stage and step tree
pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    load(conn, id, false).await
}

/// Find a pipeline by ID and hold its row lock until the transaction ends
///
/// Stages and steps are only written under this lock, so locking the root
/// serializes every transition inside the tree.
pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    load(conn, id, true).await
}

async fn load(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Pipeline>, sqlx::Error> {
    let sql = format!(
        "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );

    let Some(row) = sqlx::query_as::<_, PipelineRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let mut pipelines = vec![Pipeline::try_from(row)?];
    attach_stages(&mut *conn, &mut pipelines).await?;
    Ok(pipelines.pop())
}

/// List pipelines, newest first
pub async fn list(
    pool: &PgPool,
    filter: PipelineFilter,
    limit: Option<i64>,
) -> Result<Vec<Pipeline>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::uuid IS NULL OR deployment_id = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#
    );

    let rows = sqlx::query_as::<_, PipelineRow>(&sql)
        .bind(filter.status.map(RunStatus::as_str))
        .bind(filter.deployment_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut pipelines = rows
        .into_iter()
        .map(Pipeline::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let mut conn = pool.acquire().await?;
    attach_stages(&mut conn, &mut pipelines).await?;
    Ok(pipelines)
}

/// IN_PROGRESS pipelines started before `cutoff`, oldest first
pub async fn find_started_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Pipeline>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE status = $1 AND started_at < $2
        ORDER BY started_at ASC
        "#
    );

    let rows = sqlx::query_as::<_, PipelineRow>(&sql)
        .bind(RunStatus::InProgress.as_str())
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

    let mut pipelines = rows
        .into_iter()
        .map(Pipeline::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let mut conn = pool.acquire().await?;
    attach_stages(&mut conn, &mut pipelines).await?;
    Ok(pipelines)
}

/// Number of pipelines per stored status
pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(RunStatus, i64)>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM pipelines GROUP BY status")
            .fetch_all(pool)
            .await?;

    decode_counts(rows)
}

/// Write the lifecycle columns of the pipeline, every stage and every step
pub async fn save_lifecycles(conn: &mut PgConnection, pipeline: &Pipeline) -> Result<(), sqlx::Error> {
    save_run_lifecycle(&mut *conn, RunTable::Pipelines, pipeline.id, &pipeline.lifecycle).await?;

    for stage in &pipeline.stages {
        save_stage_lifecycles(&mut *conn, stage).await?;
    }

    Ok(())
}

/// Write the lifecycle columns of a stage and its steps
pub async fn save_stage_lifecycles(
    conn: &mut PgConnection,
    stage: &PipelineStage,
) -> Result<(), sqlx::Error> {
    save_run_lifecycle(&mut *conn, RunTable::PipelineStages, stage.id, &stage.lifecycle).await?;

    for step in &stage.steps {
        save_run_lifecycle(&mut *conn, RunTable::PipelineSteps, step.id, &step.lifecycle).await?;
    }

    Ok(())
}

/// Write the lifecycle columns and logs of a step
pub async fn save_step(conn: &mut PgConnection, step: &PipelineStep) -> Result<(), sqlx::Error> {
    save_run_lifecycle(&mut *conn, RunTable::PipelineSteps, step.id, &step.lifecycle).await?;

    sqlx::query("UPDATE pipeline_steps SET logs = $1 WHERE id = $2")
        .bind(&step.logs)
        .bind(step.id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete a pipeline by ID; stages and steps go with it
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Load the stages and steps of every given pipeline, ordered by position
async fn attach_stages(
    conn: &mut PgConnection,
    pipelines: &mut [Pipeline],
) -> Result<(), sqlx::Error> {
    let pipeline_ids: Vec<Uuid> = pipelines.iter().map(|p| p.id).collect();
    if pipeline_ids.is_empty() {
        return Ok(());
    }

    let mut stages = stages_of(&mut *conn, &pipeline_ids).await?;
    let stage_ids: Vec<Uuid> = stages.iter().map(|s| s.id).collect();
    let mut steps = steps_of(&mut *conn, &stage_ids).await?;

    for stage in &mut stages {
        stage.steps = steps.remove(&stage.id).unwrap_or_default();
    }

    let mut by_pipeline: HashMap<Uuid, Vec<PipelineStage>> = HashMap::new();
    for stage in stages {
        by_pipeline.entry(stage.pipeline_id).or_default().push(stage);
    }

    for pipeline in pipelines {
        pipeline.stages = by_pipeline.remove(&pipeline.id).unwrap_or_default();
    }

    Ok(())
}

async fn stages_of<'c>(
    executor: impl PgExecutor<'c>,
    pipeline_ids: &[Uuid],
) -> Result<Vec<PipelineStage>, sqlx::Error> {
    let sql = format!(
        "SELECT {STAGE_COLUMNS} FROM pipeline_stages \
         WHERE pipeline_id = ANY($1) ORDER BY pipeline_id, position"
    );

    sqlx::query_as::<_, StageRow>(&sql)
        .bind(pipeline_ids)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(PipelineStage::try_from)
        .collect()
}

async fn steps_of<'c>(
    executor: impl PgExecutor<'c>,
    stage_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<PipelineStep>>, sqlx::Error> {
    if stage_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {STEP_COLUMNS} FROM pipeline_steps \
         WHERE stage_id = ANY($1) ORDER BY stage_id, position"
    );

    let rows = sqlx::query_as::<_, StepRow>(&sql)
        .bind(stage_ids)
        .fetch_all(executor)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<PipelineStep>> = HashMap::new();
    for row in rows {
        let step = PipelineStep::try_from(row)?;
        grouped.entry(step.stage_id).or_default().push(step);
    }

    Ok(grouped)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    name: String,
    deployment_id: Uuid,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    lifecycle: LifecycleColumns,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = sqlx::Error;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        Ok(Pipeline {
            id: row.id,
            name: row.name,
            deployment_id: row.deployment_id,
            created_at: row.created_at,
            stages: Vec::new(),
            lifecycle: row.lifecycle.restore()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StageRow {
    id: Uuid,
    pipeline_id: Uuid,
    name: String,
    position: i32,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    lifecycle: LifecycleColumns,
}

impl TryFrom<StageRow> for PipelineStage {
    type Error = sqlx::Error;

    fn try_from(row: StageRow) -> Result<Self, Self::Error> {
        Ok(PipelineStage {
            id: row.id,
            pipeline_id: row.pipeline_id,
            name: row.name,
            position: row.position,
            created_at: row.created_at,
            steps: Vec::new(),
            lifecycle: row.lifecycle.restore()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    stage_id: Uuid,
    name: String,
    position: i32,
    created_at: DateTime<Utc>,
    logs: String,
    #[sqlx(flatten)]
    lifecycle: LifecycleColumns,
}

impl TryFrom<StepRow> for PipelineStep {
    type Error = sqlx::Error;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(PipelineStep {
            id: row.id,
            stage_id: row.stage_id,
            name: row.name,
            position: row.position,
            created_at: row.created_at,
            logs: row.logs,
            lifecycle: row.lifecycle.restore()?,
        })
    }
}
