//! Configuration-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use keel_core::domain::configuration::Configuration;
use keel_core::domain::environment::Environment;
use keel_core::dto::configuration::{
    ConfigurationStats, CreateConfiguration, NewVersion, PatchConfiguration,
};
use uuid::Uuid;

impl OrchestratorClient {
    pub async fn create_configuration(&self, req: CreateConfiguration) -> Result<Configuration> {
        let url = self.url("/api/configurations");
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List configurations, optionally for one environment
    pub async fn list_configurations(
        &self,
        environment: Option<Environment>,
    ) -> Result<Vec<Configuration>> {
        let url = self.url("/api/configurations");
        let query: Vec<_> = environment
            .map(|env| ("environment", env.as_str()))
            .into_iter()
            .collect();
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// Latest version of a configuration in an environment
    pub async fn latest_configuration(
        &self,
        name: &str,
        environment: Environment,
    ) -> Result<Configuration> {
        let url = self.url("/api/configurations/latest");
        let query = [("name", name), ("environment", environment.as_str())];
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// One specific version of a configuration in an environment
    pub async fn configuration_version(
        &self,
        name: &str,
        environment: Environment,
        version: &str,
    ) -> Result<Configuration> {
        let url = self.url("/api/configurations/version");
        let query = [
            ("name", name),
            ("environment", environment.as_str()),
            ("version", version),
        ];
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    pub async fn configuration_stats(&self) -> Result<ConfigurationStats> {
        let url = self.url("/api/configurations/stats");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_configuration(&self, config_id: Uuid) -> Result<Configuration> {
        let url = self.url(&format!("/api/configurations/{}", config_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn delete_configuration(&self, config_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/configurations/{}", config_id));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Delete every version of a configuration in an environment
    pub async fn delete_configurations(&self, name: &str, environment: Environment) -> Result<()> {
        let url = self.url("/api/configurations");
        let query = [("name", name), ("environment", environment.as_str())];
        let response = self.client.delete(&url).query(&query).send().await?;

        self.handle_empty_response(response).await
    }

    /// Merge data entries and secret references into a configuration
    pub async fn patch_configuration(
        &self,
        config_id: Uuid,
        req: PatchConfiguration,
    ) -> Result<Configuration> {
        let url = self.url(&format!("/api/configurations/{}/data", config_id));
        let response = self.client.patch(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Derive a new version carrying over data and secret references
    pub async fn new_configuration_version(
        &self,
        config_id: Uuid,
        req: NewVersion,
    ) -> Result<Configuration> {
        let url = self.url(&format!("/api/configurations/{}/versions", config_id));
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }
}
