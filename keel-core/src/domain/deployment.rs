//! Deployment domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::environment::Environment;
use crate::lifecycle::{
    self, EntityKind, Lifecycle, RUN_TABLE, RunStatus, Stateful, TransitionTable,
};

/// Rollout strategy of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Rolling,
    BlueGreen,
    Canary,
}

wire_names!(Strategy, "strategy" {
    Rolling => "ROLLING",
    BlueGreen => "BLUE_GREEN",
    Canary => "CANARY",
});

/// A release of one or more components to an environment
///
/// Owns its components: deleting the deployment deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub environment: Environment,
    pub strategy: Strategy,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub components: Vec<DeploymentComponent>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<RunStatus>,
}

impl Deployment {
    /// Create a PENDING deployment with a fresh identifier
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        environment: Environment,
        strategy: Strategy,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            environment,
            strategy,
            created_by: created_by.into(),
            created_at: lifecycle::now(),
            metadata: HashMap::new(),
            components: Vec::new(),
            lifecycle: Lifecycle::new(RunStatus::Pending),
        }
    }

    /// Add a PENDING component owned by this deployment
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> &mut DeploymentComponent {
        let component = DeploymentComponent::new(self.id, name, version);
        self.components.push(component);
        let last = self.components.len() - 1;
        &mut self.components[last]
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn component(&self, id: Uuid) -> Option<&DeploymentComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn component_mut(&mut self, id: Uuid) -> Option<&mut DeploymentComponent> {
        self.components.iter_mut().find(|c| c.id == id)
    }

    /// Cancel every component that is still PENDING or IN_PROGRESS
    pub fn cancel_open_components(&mut self, at: DateTime<Utc>) -> usize {
        lifecycle::cancel_open(self.components.iter_mut(), at)
    }
}

impl Stateful for Deployment {
    type Status = RunStatus;
    const KIND: EntityKind = EntityKind::Deployment;

    fn table() -> &'static TransitionTable<RunStatus> {
        &RUN_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<RunStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
        &mut self.lifecycle
    }
}

/// One deployable unit inside a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentComponent {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<RunStatus>,
}

impl DeploymentComponent {
    pub fn new(deployment_id: Uuid, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            name: name.into(),
            version: version.into(),
            created_at: lifecycle::now(),
            lifecycle: Lifecycle::new(RunStatus::Pending),
        }
    }
}

impl Stateful for DeploymentComponent {
    type Status = RunStatus;
    const KIND: EntityKind = EntityKind::DeploymentComponent;

    fn table() -> &'static TransitionTable<RunStatus> {
        &RUN_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<RunStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
        &mut self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{Operation, RunLifecycle};

    fn deployment() -> Deployment {
        Deployment::new(
            "checkout",
            Some("checkout service rollout".to_string()),
            Environment::Staging,
            Strategy::Canary,
            "alice",
        )
    }

    #[test]
    fn test_new_deployment_is_pending() {
        let d = deployment();
        assert_eq!(d.status(), RunStatus::Pending);
        assert!(d.lifecycle.started_at().is_none());
        assert!(d.lifecycle.completed_at().is_none());
        assert!(d.components.is_empty());
    }

    #[test]
    fn test_component_cancel_then_start_fails() {
        let mut d = deployment();
        let component = d.add_component("api", "1.4.2");
        assert_eq!(component.status(), RunStatus::Pending);

        component.cancel().unwrap();
        assert_eq!(component.status(), RunStatus::Cancelled);
        assert!(component.lifecycle.completed_at().is_some());

        let err = component.start().unwrap_err();
        assert_eq!(err.kind, EntityKind::DeploymentComponent);
        assert_eq!(err.operation, Operation::Start);
        assert_eq!(component.status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_component_belongs_to_deployment() {
        let mut d = deployment();
        let component_id = d.add_component("worker", "2.0.0").id;
        let component = d.component(component_id).unwrap();
        assert_eq!(component.deployment_id, d.id);
    }

    #[test]
    fn test_deployment_cancel_does_not_touch_components() {
        let mut d = deployment();
        d.add_component("api", "1.0.0");
        d.cancel().unwrap();
        assert_eq!(d.components[0].status(), RunStatus::Pending);
    }

    #[test]
    fn test_cancel_open_components() {
        let mut d = deployment();
        d.add_component("api", "1.0.0").start().unwrap();
        d.add_component("db", "1.0.0");
        let done = d.add_component("cache", "1.0.0");
        done.start().unwrap();
        done.complete().unwrap();

        assert_eq!(d.cancel_open_components(lifecycle::now()), 2);
        assert_eq!(d.components[0].status(), RunStatus::Cancelled);
        assert_eq!(d.components[1].status(), RunStatus::Cancelled);
        assert_eq!(d.components[2].status(), RunStatus::Completed);
    }

    #[test]
    fn test_deployment_json_round_trip() {
        let mut d = deployment();
        d.add_metadata("ticket", "OPS-42");
        d.add_component("api", "1.0.0");
        d.start().unwrap();
        d.fail(Some("health check timed out")).unwrap();

        let json = serde_json::to_string(&d).unwrap();
        let back: Deployment = serde_json::from_str(&json).unwrap();

        assert_eq!(back, d);
        assert_eq!(back.lifecycle.started_at(), d.lifecycle.started_at());
        assert_eq!(back.lifecycle.completed_at(), d.lifecycle.completed_at());
    }

    #[test]
    fn test_deployment_json_shape() {
        let d = deployment();
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["strategy"], "CANARY");
        assert_eq!(value["environment"], "STAGING");
        assert!(value.get("started_at").is_none());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("blue-green".parse::<Strategy>(), Ok(Strategy::BlueGreen));
        assert!("big-bang".parse::<Strategy>().is_err());
    }
}
