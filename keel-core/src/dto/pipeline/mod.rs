//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::Pipeline;
use crate::lifecycle::{RunStatus, Stateful};

/// Request to create a new pipeline with its stages and steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub deployment_id: Uuid,
    #[serde(default)]
    pub stages: Vec<NewStage>,
}

/// Stage in a pipeline creation request; steps are given by name in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Log text to append to a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogs {
    pub logs: String,
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub deployment_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stage_count: i64,
}

impl From<Pipeline> for PipelineSummary {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            id: pipeline.id,
            status: pipeline.status(),
            started_at: pipeline.lifecycle.started_at(),
            completed_at: pipeline.lifecycle.completed_at(),
            stage_count: pipeline.stages.len() as i64,
            name: pipeline.name,
            deployment_id: pipeline.deployment_id,
            created_at: pipeline.created_at,
        }
    }
}

impl CreatePipeline {
    /// Build the PENDING aggregate described by this request
    pub fn into_pipeline(self) -> Pipeline {
        let mut pipeline = Pipeline::new(self.name, self.deployment_id);
        for stage in self.stages {
            let created = pipeline.add_stage(stage.name);
            for step in stage.steps {
                created.add_step(step);
            }
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_pipeline_builds_pending_tree() {
        let req: CreatePipeline = serde_json::from_value(serde_json::json!({
            "name": "release",
            "deployment_id": Uuid::new_v4(),
            "stages": [
                { "name": "build", "steps": ["compile", "test"] },
                { "name": "deploy" }
            ]
        }))
        .unwrap();

        let pipeline = req.into_pipeline();
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[0].steps.len(), 2);
        assert!(pipeline.stages[1].steps.is_empty());
        assert!(
            pipeline
                .stages
                .iter()
                .flat_map(|s| s.steps.iter())
                .all(|s| s.status() == RunStatus::Pending)
        );
    }

    #[test]
    fn test_summary_counts_stages() {
        let mut pipeline = Pipeline::new("release", Uuid::new_v4());
        pipeline.add_stage("build");
        let summary = PipelineSummary::from(pipeline.clone());
        assert_eq!(summary.stage_count, 1);
        assert_eq!(summary.status, RunStatus::Pending);
        assert_eq!(summary.id, pipeline.id);
    }
}
