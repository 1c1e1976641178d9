//! Rate limiting middleware
//!
//! Applied to every `/api` route. Requests are keyed by client and endpoint;
//! the client is the peer address. `X-Forwarded-For` is set by whoever sends
//! the request, so its first hop is used only when the policy trusts it, which
//! is only safe behind a proxy that overwrites the header.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::error::{ApiError, rate_limit_headers};
use crate::rate_limit::{RateLimitPolicy, RateLimiter};

/// State of the rate limiting layer
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    pub policy: Arc<RateLimitPolicy>,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
        }
    }
}

pub async fn rate_limit(
    State(limits): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request, limits.policy.trust_forwarded_for);
    let (endpoint, limit) = {
        let (endpoint, limit) = limits.policy.resolve(request.uri().path());
        (endpoint.to_string(), limit)
    };
    let key = format!("{}:{}", client, endpoint);

    match limits
        .limiter
        .try_acquire(&key, limit, limits.policy.window)
        .await
    {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            for (name, value) in rate_limit_headers(&decision) {
                headers.insert(name, value);
            }
            response
        }
        Ok(decision) => {
            tracing::warn!(
                "Rate limit exceeded for client: {} on endpoint: {}",
                client,
                endpoint
            );
            ApiError::TooManyRequests(decision).into_response()
        }
        Err(err) => {
            // an unavailable store must not take the API down with it
            tracing::error!("Rate limit check failed, admitting request: {}", err);
            next.run(request).await
        }
    }
}

fn client_id(request: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    if let Some(hop) = forwarded {
        return hop.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limit: u32) -> Router {
        let policy = RateLimitPolicy {
            window: Duration::from_secs(60),
            default_limit: 100,
            endpoints: vec![("/api/pipelines".to_string(), limit)],
            trust_forwarded_for: true,
        };
        let limits = RateLimitState::new(RateLimiter::in_memory(), policy);

        Router::new()
            .route("/api/pipelines", get(|| async { "pipelines" }))
            .route("/api/deployments", get(|| async { "deployments" }))
            .route_layer(middleware::from_fn_with_state(limits, rate_limit))
    }

    fn request(uri: &str, client: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_after_limit() {
        let app = app(2);

        for remaining in ["1", "0"] {
            let response = app
                .clone()
                .oneshot(request("/api/pipelines", "10.0.0.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "2");
            assert_eq!(response.headers()[X_RATELIMIT_REMAINING], remaining);
        }

        let response = app
            .clone()
            .oneshot(request("/api/pipelines", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));

        // other clients and other endpoints keep their own budget
        let response = app
            .clone()
            .oneshot(request("/api/pipelines", "10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("/api/deployments", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_client_id_uses_first_forwarded_hop() {
        let req = request("/", " 203.0.113.9 , 10.0.0.1");
        assert_eq!(client_id(&req, true), "203.0.113.9");

        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_id(&req, true), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 5555))));
        assert_eq!(client_id(&req, true), "192.0.2.7");
    }

    #[test]
    fn test_untrusted_forwarded_header_is_ignored() {
        let mut req = request("/", "203.0.113.9");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 5555))));

        assert_eq!(client_id(&req, false), "192.0.2.7");
    }
}
