//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use keel_core::domain::pipeline::{Pipeline, PipelineStage, PipelineStep};
use keel_core::dto::lifecycle::StatusStats;
use keel_core::dto::pipeline::{AppendLogs, CreatePipeline, PipelineSummary};
use keel_core::lifecycle::{Operation, RunStatus};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a pipeline with its stages and steps
    ///
    /// # Example
    /// ```no_run
    /// # use keel_client::OrchestratorClient;
    /// # use keel_core::dto::pipeline::{CreatePipeline, NewStage};
    /// # use uuid::Uuid;
    /// # async fn example(deployment_id: Uuid) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let pipeline = client.create_pipeline(CreatePipeline {
    ///     name: "release".to_string(),
    ///     deployment_id,
    ///     stages: vec![NewStage {
    ///         name: "build".to_string(),
    ///         steps: vec!["compile".to_string(), "test".to_string()],
    ///     }],
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<Pipeline> {
        let url = self.url("/api/pipelines");
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List pipelines, optionally filtered by status and deployment
    pub async fn list_pipelines(
        &self,
        status: Option<RunStatus>,
        deployment_id: Option<Uuid>,
    ) -> Result<Vec<PipelineSummary>> {
        let mut query = Vec::new();
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        if let Some(deployment_id) = deployment_id {
            query.push(("deployment_id", deployment_id.to_string()));
        }

        let url = self.url("/api/pipelines");
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    pub async fn recent_pipelines(&self, limit: Option<i64>) -> Result<Vec<PipelineSummary>> {
        let url = self.url("/api/pipelines/recent");
        let query: Vec<_> = limit.map(|limit| ("limit", limit)).into_iter().collect();
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// IN_PROGRESS pipelines started more than `minutes` ago
    pub async fn long_running_pipelines(&self, minutes: Option<i64>) -> Result<Vec<PipelineSummary>> {
        let url = self.url("/api/pipelines/long-running");
        let query: Vec<_> = minutes
            .map(|minutes| ("minutes", minutes))
            .into_iter()
            .collect();
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    pub async fn pipeline_stats(&self) -> Result<StatusStats> {
        let url = self.url("/api/pipelines/stats");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline with all stages and steps
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let url = self.url(&format!("/api/pipelines/{}", pipeline_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a pipeline
    pub async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/api/pipelines/{}", pipeline_id));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    pub async fn transition_pipeline(
        &self,
        pipeline_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<Pipeline> {
        let resource = format!("/api/pipelines/{}", pipeline_id);
        self.apply_operation(&resource, operation, reason).await
    }

    // =============================================================================
    // Stages and Steps
    // =============================================================================

    pub async fn transition_stage(
        &self,
        pipeline_id: Uuid,
        stage_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<PipelineStage> {
        let resource = format!("/api/pipelines/{}/stages/{}", pipeline_id, stage_id);
        self.apply_operation(&resource, operation, reason).await
    }

    pub async fn transition_step(
        &self,
        pipeline_id: Uuid,
        stage_id: Uuid,
        step_id: Uuid,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<PipelineStep> {
        let resource = format!(
            "/api/pipelines/{}/stages/{}/steps/{}",
            pipeline_id, stage_id, step_id
        );
        self.apply_operation(&resource, operation, reason).await
    }

    /// Append log lines to a step
    pub async fn append_step_logs(
        &self,
        pipeline_id: Uuid,
        stage_id: Uuid,
        step_id: Uuid,
        logs: impl Into<String>,
    ) -> Result<PipelineStep> {
        let url = self.url(&format!(
            "/api/pipelines/{}/stages/{}/steps/{}/logs",
            pipeline_id, stage_id, step_id
        ));
        let req = AppendLogs { logs: logs.into() };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }
}
