//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every handler
//! returns [`ApiResult`] and converts service errors with `?`.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use keel_core::lifecycle::TransitionError;

use crate::rate_limit::Decision;
use crate::service::ServiceError;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(TransitionError),
    TooManyRequests(Decision),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(err) => {
                let body = serde_json::json!({
                    "error": err.to_string(),
                    "kind": err.kind,
                    "entity_id": err.entity_id,
                    "operation": err.operation,
                    "current": err.current,
                });
                return (StatusCode::CONFLICT, Json(body)).into_response();
            }
            ApiError::TooManyRequests(decision) => {
                let body = serde_json::json!({
                    "error": "Rate limit exceeded. Please try again later."
                });
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                for (name, value) in rate_limit_headers(&decision) {
                    headers.insert(name, value);
                }
                headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs(&decision)));
                return response;
            }
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ServiceError::Transition(err) => ApiError::Conflict(err),
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::Database(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `X-RateLimit-*` headers describing a decision
pub fn rate_limit_headers(decision: &Decision) -> [(HeaderName, HeaderValue); 3] {
    [
        (X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit)),
        (X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining)),
        (X_RATELIMIT_RESET, HeaderValue::from(reset_secs(decision))),
    ]
}

/// Whole seconds until the window resets, rounded up
fn reset_secs(decision: &Decision) -> u64 {
    (decision.reset_after.as_millis() as u64).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use keel_core::lifecycle::{EntityKind, Operation};
    use std::time::Duration;
    use uuid::Uuid;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_transition_error_maps_to_conflict() {
        let id = Uuid::new_v4();
        let err = ServiceError::Transition(TransitionError {
            kind: EntityKind::Pipeline,
            entity_id: id,
            operation: Operation::Start,
            current: "COMPLETED".to_string(),
        });

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "PIPELINE");
        assert_eq!(body["operation"], "start");
        assert_eq!(body["current"], "COMPLETED");
        assert_eq!(body["entity_id"], id.to_string());
        assert!(body["error"].as_str().unwrap().starts_with("cannot start pipeline"));
    }

    #[tokio::test]
    async fn test_not_found_and_validation_statuses() {
        let not_found = ApiError::from(ServiceError::not_found("deployment", Uuid::nil()));
        let response = not_found.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let invalid = ApiError::from(ServiceError::Validation("name must not be empty".into()));
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let response = ApiError::from(ServiceError::Database(sqlx::Error::RowNotFound)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_too_many_requests_headers() {
        let decision = Decision {
            allowed: false,
            limit: 30,
            remaining: 0,
            reset_after: Duration::from_millis(12_300),
        };
        let response = ApiError::TooManyRequests(decision).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers[X_RATELIMIT_LIMIT], "30");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[X_RATELIMIT_RESET], "13");
        assert_eq!(headers[header::RETRY_AFTER], "13");
    }
}
