//! Keel HTTP Client
//!
//! A type-safe HTTP client for the Keel orchestrator API, used by the CLI.
//!
//! # Example
//!
//! ```no_run
//! use keel_client::OrchestratorClient;
//! use keel_core::domain::{deployment::Strategy, environment::Environment};
//! use keel_core::dto::deployment::CreateDeployment;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let deployment = client.create_deployment(CreateDeployment {
//!         name: "checkout".to_string(),
//!         description: None,
//!         environment: Environment::Staging,
//!         strategy: Strategy::Canary,
//!         created_by: "alice".to_string(),
//!         metadata: Default::default(),
//!         components: Vec::new(),
//!     }).await?;
//!
//!     println!("Created deployment: {}", deployment.id);
//!     Ok(())
//! }
//! ```

mod configurations;
mod deployments;
pub mod error;
mod infrastructure;
mod pipelines;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use infrastructure::InfrastructureQuery;

use keel_core::dto::lifecycle::FailRequest;
use keel_core::lifecycle::Operation;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;

/// HTTP client for the Keel orchestrator API
///
/// Methods are grouped per resource: deployments, pipelines, infrastructure
/// and configurations.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use keel_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `{resource}/{operation}`, or `{resource}/fail` with a reason
    async fn apply_operation<T: DeserializeOwned>(
        &self,
        resource: &str,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<T> {
        let url = self.url(&format!("{}/{}", resource, operation));
        tracing::debug!("POST {}", url);

        let request = self.client.post(&url);
        let request = match operation {
            Operation::Fail => request.json(&FailRequest {
                reason: reason.map(str::to_string),
            }),
            _ => request,
        };
        let response = request.send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(ClientError::RateLimited { retry_after });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ClientError::api_error(status.as_u16(), error_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("/api/deployments"),
            "http://localhost:8080/api/deployments"
        );
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_is_request_failure() {
        let client = OrchestratorClient::new("http://127.0.0.1:1");
        let err = client.deployment_stats().await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed(_)));
        assert!(!err.is_client_error());
    }
}
