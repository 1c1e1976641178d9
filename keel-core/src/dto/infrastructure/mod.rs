//! Infrastructure DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::environment::Environment;
use crate::domain::infrastructure::InfrastructureType;

/// Request to register new infrastructure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInfrastructure {
    pub name: String,
    #[serde(rename = "type")]
    pub infra_type: InfrastructureType,
    pub environment: Environment,
    #[serde(default)]
    pub resources: HashMap<String, String>,
}

/// Edit of name and resources; status is never accepted here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInfrastructure {
    pub name: Option<String>,
    pub resources: Option<HashMap<String, String>>,
}
