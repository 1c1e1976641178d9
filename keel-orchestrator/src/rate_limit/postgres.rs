//! Postgres-backed rate limit store

use async_trait::async_trait;
use sqlx::PgPool;

use super::{RateLimitError, RateLimitStore};

/// Window counters in the `rate_limit_windows` table
///
/// Each hit is one atomic upsert, so instances sharing the database share
/// one budget per key.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PostgresStore {
    async fn hit(
        &self,
        key: &str,
        window_start: i64,
        limit: u32,
    ) -> Result<Option<u32>, RateLimitError> {
        // No row comes back when the current window is already full.
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_windows (key, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (key) DO UPDATE
            SET window_start = EXCLUDED.window_start,
                count = CASE
                    WHEN rate_limit_windows.window_start < EXCLUDED.window_start THEN 1
                    ELSE rate_limit_windows.count + 1
                END
            WHERE rate_limit_windows.window_start < EXCLUDED.window_start
               OR rate_limit_windows.count < $3
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(window_start)
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(|c| c.max(0) as u32))
    }
}
