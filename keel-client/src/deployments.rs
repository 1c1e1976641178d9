//! Deployment-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use keel_core::domain::deployment::{Deployment, DeploymentComponent};
use keel_core::domain::environment::Environment;
use keel_core::dto::deployment::{
    CreateDeployment, DeploymentSummary, NewComponent, UpdateDeployment,
};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::{Operation, RunStatus};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Deployment Management
    // =============================================================================

    /// Create a new deployment, optionally with its initial components
    pub async fn create_deployment(&self, req: CreateDeployment) -> Result<Deployment> {
        let url = self.url("/api/deployments");
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List deployments, optionally filtered by status and environment
    pub async fn list_deployments(
        &self,
        status: Option<RunStatus>,
        environment: Option<Environment>,
    ) -> Result<Vec<DeploymentSummary>> {
        let mut query = Vec::new();
        if let Some(status) = status {
            query.push(("status", status.as_str()));
        }
        if let Some(environment) = environment {
            query.push(("environment", environment.as_str()));
        }

        let url = self.url("/api/deployments");
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// Most recently created deployments, newest first
    pub async fn recent_deployments(&self, limit: Option<i64>) -> Result<Vec<DeploymentSummary>> {
        let url = self.url("/api/deployments/recent");
        let query: Vec<_> = limit.map(|limit| ("limit", limit)).into_iter().collect();
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// Number of deployments per status
    pub async fn deployment_stats(&self) -> Result<StatusStats> {
        let url = self.url("/api/deployments/stats");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a deployment with its components
    pub async fn get_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let url = self.url(&format!("/api/deployments/{}", deployment_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Edit the descriptive fields of a deployment
    pub async fn update_deployment(
        &self,
        deployment_id: Uuid,
        req: UpdateDeployment,
    ) -> Result<Deployment> {
        let url = self.url(&format!("/api/deployments/{}", deployment_id));
        let response = self.client.put(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Delete a deployment together with its components and pipelines
    pub async fn delete_deployment(&self, deployment_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/deployments/{}", deployment_id));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Apply a lifecycle operation to a deployment
    ///
    /// `reason` is only sent for [`Operation::Fail`].
    pub async fn transition_deployment(
        &self,
        deployment_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<Deployment> {
        let resource = format!("/api/deployments/{}", deployment_id);
        self.apply_operation(&resource, operation, reason).await
    }

    // =============================================================================
    // Components
    // =============================================================================

    /// Add a component to an existing deployment
    pub async fn add_component(
        &self,
        deployment_id: Uuid,
        req: NewComponent,
    ) -> Result<DeploymentComponent> {
        let url = self.url(&format!("/api/deployments/{}/components", deployment_id));
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn transition_component(
        &self,
        deployment_id: Uuid,
        component_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<DeploymentComponent> {
        let resource = format!(
            "/api/deployments/{}/components/{}",
            deployment_id, component_id
        );
        self.apply_operation(&resource, operation, reason).await
    }
}
