//! Status enums for lifecycle-bearing entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::names::UnknownName;

/// A closed set of states that a transition table ranges over
pub trait LifecycleStatus:
    Copy + Eq + fmt::Debug + fmt::Display + FromStr<Err = UnknownName> + Send + Sync + 'static
{
    /// Every state of the enum
    fn variants() -> &'static [Self];
}

/// Status of deployments, deployment components, pipelines, stages and steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

wire_names!(RunStatus, "run status" {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl LifecycleStatus for RunStatus {
    fn variants() -> &'static [Self] {
        RunStatus::ALL
    }
}

/// Status of an infrastructure resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfrastructureStatus {
    Provisioning,
    Active,
    Updating,
    Deleting,
    Failed,
}

wire_names!(InfrastructureStatus, "infrastructure status" {
    Provisioning => "PROVISIONING",
    Active => "ACTIVE",
    Updating => "UPDATING",
    Deleting => "DELETING",
    Failed => "FAILED",
});

impl LifecycleStatus for InfrastructureStatus {
    fn variants() -> &'static [Self] {
        InfrastructureStatus::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_round_trip() {
        for status in RunStatus::ALL {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(*status));
        }
        for status in InfrastructureStatus::ALL {
            assert_eq!(
                status.as_str().parse::<InfrastructureStatus>(),
                Ok(*status)
            );
        }
    }

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!("in-progress".parse::<RunStatus>(), Ok(RunStatus::InProgress));
        assert_eq!(" active ".parse::<InfrastructureStatus>(), Ok(InfrastructureStatus::Active));
    }

    #[test]
    fn test_unknown_status() {
        let err = "RUNNING".parse::<RunStatus>().unwrap_err();
        assert_eq!(err.kind, "run status");
        assert_eq!(err.value, "RUNNING");
    }

    #[test]
    fn test_status_serde_matches_wire_name() {
        let json = serde_json::to_string(&RunStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let back: InfrastructureStatus = serde_json::from_str("\"DELETING\"").unwrap();
        assert_eq!(back, InfrastructureStatus::Deleting);
    }
}
