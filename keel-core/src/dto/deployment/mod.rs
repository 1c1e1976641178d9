//! Deployment DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::deployment::{Deployment, Strategy};
use crate::domain::environment::Environment;
use crate::lifecycle::{RunStatus, Stateful};

/// Request to create a new deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeployment {
    pub name: String,
    pub description: Option<String>,
    pub environment: Environment,
    pub strategy: Strategy,
    pub created_by: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub components: Vec<NewComponent>,
}

/// Component to add to a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComponent {
    pub name: String,
    pub version: String,
}

/// Edit of descriptive fields; status is never accepted here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDeployment {
    pub name: Option<String>,
    pub description: Option<String>,
    pub strategy: Option<Strategy>,
    pub metadata: Option<HashMap<String, String>>,
}

/// Lightweight deployment summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: Uuid,
    pub name: String,
    pub environment: Environment,
    pub strategy: Strategy,
    pub status: RunStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub component_count: i64,
}

impl From<Deployment> for DeploymentSummary {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            status: deployment.status(),
            started_at: deployment.lifecycle.started_at(),
            completed_at: deployment.lifecycle.completed_at(),
            component_count: deployment.components.len() as i64,
            name: deployment.name,
            environment: deployment.environment,
            strategy: deployment.strategy,
            created_by: deployment.created_by,
            created_at: deployment.created_at,
        }
    }
}
