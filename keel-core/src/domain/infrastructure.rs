//! Infrastructure domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::environment::Environment;
use crate::lifecycle::{
    self, EntityKind, INFRASTRUCTURE_TABLE, InfrastructureStatus, Lifecycle, Operation,
    Stateful, TransitionError, TransitionTable,
};

/// Kind of platform backing an infrastructure record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfrastructureType {
    Kubernetes,
    Vm,
    Serverless,
}

wire_names!(InfrastructureType, "infrastructure type" {
    Kubernetes => "KUBERNETES",
    Vm => "VM",
    Serverless => "SERVERLESS",
});

/// Infrastructure resources for a deployment environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub infra_type: InfrastructureType,
    pub environment: Environment,
    #[serde(default)]
    pub resources: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<InfrastructureStatus>,
}

impl Infrastructure {
    /// Create a PROVISIONING record with a fresh identifier
    pub fn new(
        name: impl Into<String>,
        infra_type: InfrastructureType,
        environment: Environment,
    ) -> Self {
        let now = lifecycle::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            infra_type,
            environment,
            resources: HashMap::new(),
            created_at: now,
            updated_at: now,
            lifecycle: Lifecycle::new(InfrastructureStatus::Provisioning),
        }
    }

    pub fn add_resource(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.resources.insert(key.into(), value.into());
        self.updated_at = lifecycle::now();
    }

    /// PROVISIONING or UPDATING -> ACTIVE
    pub fn activate(&mut self) -> Result<InfrastructureStatus, TransitionError> {
        self.transition(Operation::Activate, None)
    }

    /// ACTIVE -> UPDATING
    pub fn update(&mut self) -> Result<InfrastructureStatus, TransitionError> {
        self.transition(Operation::Update, None)
    }

    /// Anything but DELETING -> DELETING
    pub fn delete(&mut self) -> Result<InfrastructureStatus, TransitionError> {
        self.transition(Operation::Delete, None)
    }

    /// PROVISIONING, ACTIVE or UPDATING -> FAILED
    pub fn fail(&mut self, reason: Option<&str>) -> Result<InfrastructureStatus, TransitionError> {
        self.transition(Operation::Fail, reason)
    }
}

impl Stateful for Infrastructure {
    type Status = InfrastructureStatus;
    const KIND: EntityKind = EntityKind::Infrastructure;

    fn table() -> &'static TransitionTable<InfrastructureStatus> {
        &INFRASTRUCTURE_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<InfrastructureStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<InfrastructureStatus> {
        &mut self.lifecycle
    }

    fn after_transition(&mut self, _operation: Operation, _reason: Option<&str>, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_scenario() {
        let mut infra =
            Infrastructure::new("prod-cluster", InfrastructureType::Kubernetes, Environment::Prod);
        assert_eq!(infra.status(), InfrastructureStatus::Provisioning);

        infra.activate().unwrap();
        assert_eq!(infra.status(), InfrastructureStatus::Active);

        infra.update().unwrap();
        assert_eq!(infra.status(), InfrastructureStatus::Updating);

        infra.activate().unwrap();
        assert_eq!(infra.status(), InfrastructureStatus::Active);

        infra.delete().unwrap();
        assert_eq!(infra.status(), InfrastructureStatus::Deleting);

        let err = infra.delete().unwrap_err();
        assert_eq!(err.kind, EntityKind::Infrastructure);
        assert_eq!(err.current, "DELETING");
        assert_eq!(infra.status(), InfrastructureStatus::Deleting);
    }

    #[test]
    fn test_failed_infrastructure_can_be_deleted() {
        let mut infra = Infrastructure::new("fn-pool", InfrastructureType::Serverless, Environment::Dev);
        infra.fail(Some("quota exceeded")).unwrap();
        assert_eq!(infra.lifecycle.error_message(), Some("quota exceeded"));
        assert!(infra.activate().is_err());
        assert!(infra.fail(None).is_err());

        infra.delete().unwrap();
        assert_eq!(infra.status(), InfrastructureStatus::Deleting);
    }

    #[test]
    fn test_update_requires_active() {
        let mut infra = Infrastructure::new("vm-a", InfrastructureType::Vm, Environment::Staging);
        let err = infra.update().unwrap_err();
        assert_eq!(err.operation, Operation::Update);
        assert_eq!(infra.status(), InfrastructureStatus::Provisioning);
    }

    #[test]
    fn test_transition_touches_updated_at() {
        let mut infra = Infrastructure::new("vm-b", InfrastructureType::Vm, Environment::Dev);
        let at = infra.updated_at + chrono::TimeDelta::seconds(30);
        infra.transition_at(Operation::Activate, None, at).unwrap();
        assert_eq!(infra.updated_at, at);
        assert!(infra.lifecycle.started_at().is_none());
    }

    #[test]
    fn test_infrastructure_json_uses_type_key() {
        let infra = Infrastructure::new("k8s", InfrastructureType::Kubernetes, Environment::Prod);
        let value = serde_json::to_value(&infra).unwrap();
        assert_eq!(value["type"], "KUBERNETES");
        assert_eq!(value["status"], "PROVISIONING");
        assert!(value.get("completed_at").is_none());
    }
}
