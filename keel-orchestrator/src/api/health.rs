//! Liveness check
//!
//! Answers without touching the database or the rate limiter.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
