use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create deployments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            environment VARCHAR(20) NOT NULL,
            strategy VARCHAR(20) NOT NULL,
            created_by VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create deployment components table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployment_components (
            id UUID PRIMARY KEY,
            deployment_id UUID NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            version VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            deployment_id UUID NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL,
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create pipeline stages table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_stages (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            position INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create pipeline steps table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_steps (
            id UUID PRIMARY KEY,
            stage_id UUID NOT NULL REFERENCES pipeline_stages(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            position INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            logs TEXT NOT NULL DEFAULT '',
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create infrastructure table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS infrastructure (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            type VARCHAR(20) NOT NULL,
            environment VARCHAR(20) NOT NULL,
            resources JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            status VARCHAR(50) NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create configurations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configurations (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            environment VARCHAR(20) NOT NULL,
            version VARCHAR(100) NOT NULL,
            data JSONB NOT NULL DEFAULT '{}',
            secrets JSONB NOT NULL DEFAULT '{}',
            created_by VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (name, environment, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create rate limit windows table (shared fixed-window counters)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limit_windows (
            key TEXT PRIMARY KEY,
            window_start BIGINT NOT NULL,
            count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status)",
        "CREATE INDEX IF NOT EXISTS idx_deployments_created_at ON deployments(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_deployment_components_deployment_id ON deployment_components(deployment_id)",
        "CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status)",
        "CREATE INDEX IF NOT EXISTS idx_pipelines_deployment_id ON pipelines(deployment_id)",
        "CREATE INDEX IF NOT EXISTS idx_pipelines_created_at ON pipelines(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_pipeline_stages_pipeline_id ON pipeline_stages(pipeline_id, position)",
        "CREATE INDEX IF NOT EXISTS idx_pipeline_steps_stage_id ON pipeline_steps(stage_id, position)",
        "CREATE INDEX IF NOT EXISTS idx_infrastructure_status ON infrastructure(status)",
        "CREATE INDEX IF NOT EXISTS idx_infrastructure_environment ON infrastructure(environment, type)",
        "CREATE INDEX IF NOT EXISTS idx_configurations_lookup ON configurations(name, environment, created_at DESC)",
    ];

    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
