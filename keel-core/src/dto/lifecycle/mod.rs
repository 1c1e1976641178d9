//! DTOs shared by every lifecycle-bearing resource

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::domain::environment::Environment;
use crate::domain::infrastructure::InfrastructureType;
use crate::lifecycle::LifecycleStatus;

/// Body of a `.../fail` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Number of entities per status, with optional breakdowns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_environment: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_type: BTreeMap<String, i64>,
}

impl StatusStats {
    /// Build stats from stored counts; statuses with no rows report zero
    pub fn from_counts<S: LifecycleStatus>(counts: impl IntoIterator<Item = (S, i64)>) -> Self {
        let by_status = tally(S::variants(), counts);
        Self {
            total: by_status.values().sum(),
            by_status,
            by_environment: BTreeMap::new(),
            by_type: BTreeMap::new(),
        }
    }

    /// Add the count per environment
    pub fn with_environments(mut self, counts: impl IntoIterator<Item = (Environment, i64)>) -> Self {
        self.by_environment = tally(Environment::ALL, counts);
        self
    }

    /// Add the count per infrastructure type
    pub fn with_types(mut self, counts: impl IntoIterator<Item = (InfrastructureType, i64)>) -> Self {
        self.by_type = tally(InfrastructureType::ALL, counts);
        self
    }
}

/// Count per wire name, listing every known name even when it has no rows
pub fn tally<T: Display>(
    known: &[T],
    counts: impl IntoIterator<Item = (T, i64)>,
) -> BTreeMap<String, i64> {
    let mut tally: BTreeMap<String, i64> = known.iter().map(|k| (k.to_string(), 0)).collect();
    for (name, count) in counts {
        *tally.entry(name.to_string()).or_insert(0) += count;
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunStatus;

    #[test]
    fn test_stats_fill_missing_statuses() {
        let stats = StatusStats::from_counts([(RunStatus::Pending, 3), (RunStatus::Failed, 1)]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_status.len(), RunStatus::ALL.len());
        assert_eq!(stats.by_status["PENDING"], 3);
        assert_eq!(stats.by_status["IN_PROGRESS"], 0);
    }

    #[test]
    fn test_breakdowns_list_every_name() {
        let stats = StatusStats::from_counts([(RunStatus::Completed, 2)])
            .with_environments([(Environment::Prod, 2)]);

        assert_eq!(stats.by_environment.len(), Environment::ALL.len());
        assert_eq!(stats.by_environment["PROD"], 2);
        assert_eq!(stats.by_environment["DEV"], 0);
        assert!(stats.by_type.is_empty());

        let value = serde_json::to_value(&stats).unwrap();
        assert!(value.get("by_type").is_none());
        assert_eq!(value["by_environment"]["STAGING"], 0);
    }

    #[test]
    fn test_type_breakdown() {
        let stats = StatusStats::from_counts(Vec::<(RunStatus, i64)>::new())
            .with_types([(InfrastructureType::Vm, 3), (InfrastructureType::Vm, 1)]);
        assert_eq!(stats.by_type["VM"], 4);
        assert_eq!(stats.by_type["KUBERNETES"], 0);
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn test_fail_request_reason_is_optional() {
        let req: FailRequest = serde_json::from_str("{}").unwrap();
        assert!(req.reason.is_none());
    }
}
