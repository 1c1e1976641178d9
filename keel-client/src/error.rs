//! Error types for the Keel client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Keel client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The orchestrator rejected the request because the rate limit was hit
    #[error("Rate limit exceeded, retry after {}s", retry_after.unwrap_or(0))]
    RateLimited {
        /// Seconds until the current window resets, from `Retry-After`
        retry_after: Option<u64>,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and response body
    ///
    /// The orchestrator wraps messages as `{"error": "..."}`; the bare message
    /// is kept when the body has that shape.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error")?.as_str().map(str::to_string))
            .unwrap_or(body);
        Self::ApiError { status, message }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the entity was not in a state that allows the operation
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ApiError { status: 409, .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ApiError { status: 429, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::ApiError { status, .. } => (400..500).contains(status),
            Self::RateLimited { .. } | Self::InvalidRequest(_) => true,
            _ => false,
        }
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_unwraps_error_field() {
        let err = ClientError::api_error(404, r#"{"error":"deployment 42 not found"}"#);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API error (status 404): deployment 42 not found");
    }

    #[test]
    fn test_api_error_keeps_plain_body() {
        let err = ClientError::api_error(502, "Bad Gateway");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "API error (status 502): Bad Gateway");
    }

    #[test]
    fn test_conflict_classification() {
        let body = r#"{"error":"cannot start pipeline 1 in COMPLETED","kind":"PIPELINE","current":"COMPLETED"}"#;
        let err = ClientError::api_error(409, body);
        assert!(err.is_conflict());
        assert!(err.is_client_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_rate_limited_classification() {
        let err = ClientError::RateLimited {
            retry_after: Some(12),
        };
        assert!(err.is_rate_limited());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 12s");
        assert!(ClientError::api_error(429, "slow down").is_rate_limited());
    }
}
