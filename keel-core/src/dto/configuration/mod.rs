//! Configuration DTOs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::environment::Environment;
use crate::dto::lifecycle::tally;

/// Request to create a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConfiguration {
    pub name: String,
    pub environment: Environment,
    /// Defaults to `1.0.0`
    #[serde(default)]
    pub version: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

/// Entries merged into an existing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchConfiguration {
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

/// Request to derive a new version from an existing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVersion {
    /// Defaults to the source version with its patch number incremented
    #[serde(default)]
    pub version: Option<String>,
    pub created_by: String,
}

/// Number of configuration versions per environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationStats {
    pub total: i64,
    pub by_environment: BTreeMap<String, i64>,
}

impl ConfigurationStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (Environment, i64)>) -> Self {
        let by_environment = tally(Environment::ALL, counts);
        Self {
            total: by_environment.values().sum(),
            by_environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_optional() {
        let req: CreateConfiguration =
            serde_json::from_str(r#"{"name":"checkout","environment":"DEV","created_by":"alice"}"#)
                .unwrap();
        assert!(req.version.is_none());
        assert!(req.data.is_empty());

        let req: NewVersion = serde_json::from_str(r#"{"created_by":"bob"}"#).unwrap();
        assert!(req.version.is_none());
    }

    #[test]
    fn test_stats_total() {
        let stats = ConfigurationStats::from_counts([(Environment::Dev, 2), (Environment::Prod, 5)]);
        assert_eq!(stats.total, 7);
        assert_eq!(stats.by_environment["STAGING"], 0);
    }
}
