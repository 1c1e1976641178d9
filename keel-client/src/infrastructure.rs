//! Infrastructure-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use keel_core::domain::environment::Environment;
use keel_core::domain::infrastructure::{Infrastructure, InfrastructureType};
use keel_core::dto::infrastructure::{CreateInfrastructure, UpdateInfrastructure};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::lifecycle::{InfrastructureStatus, Operation};
use uuid::Uuid;

/// Filters for [`OrchestratorClient::list_infrastructure`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InfrastructureQuery {
    pub environment: Option<Environment>,
    pub infra_type: Option<InfrastructureType>,
    pub status: Option<InfrastructureStatus>,
}

impl InfrastructureQuery {
    fn pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut query = Vec::new();
        if let Some(environment) = self.environment {
            query.push(("environment", environment.as_str()));
        }
        if let Some(infra_type) = self.infra_type {
            query.push(("type", infra_type.as_str()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.as_str()));
        }
        query
    }
}

impl OrchestratorClient {
    /// Register infrastructure; it starts out PROVISIONING
    pub async fn create_infrastructure(&self, req: CreateInfrastructure) -> Result<Infrastructure> {
        let url = self.url("/api/infrastructure");
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn list_infrastructure(&self, filter: InfrastructureQuery) -> Result<Vec<Infrastructure>> {
        let url = self.url("/api/infrastructure");
        let response = self.client.get(&url).query(&filter.pairs()).send().await?;

        self.handle_response(response).await
    }

    pub async fn infrastructure_stats(&self) -> Result<StatusStats> {
        let url = self.url("/api/infrastructure/stats");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_infrastructure(&self, infra_id: Uuid) -> Result<Infrastructure> {
        let url = self.url(&format!("/api/infrastructure/{}", infra_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Rename infrastructure or replace its resources
    pub async fn update_infrastructure(
        &self,
        infra_id: Uuid,
        req: UpdateInfrastructure,
    ) -> Result<Infrastructure> {
        let url = self.url(&format!("/api/infrastructure/{}", infra_id));
        let response = self.client.put(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Remove the record outright
    ///
    /// Unlike the `delete` operation, which moves it to DELETING.
    pub async fn remove_infrastructure(&self, infra_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/infrastructure/{}", infra_id));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    pub async fn transition_infrastructure(
        &self,
        infra_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<Infrastructure> {
        let resource = format!("/api/infrastructure/{}", infra_id);
        self.apply_operation(&resource, operation, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_query_pairs() {
        assert!(InfrastructureQuery::default().pairs().is_empty());

        let query = InfrastructureQuery {
            environment: Some(Environment::Prod),
            infra_type: Some(InfrastructureType::Kubernetes),
            status: None,
        };
        assert_eq!(
            query.pairs(),
            vec![("environment", "PROD"), ("type", "KUBERNETES")]
        );
    }
}
