//! Configuration domain types
//!
//! Configurations are versioned key/value sets per (name, environment).
//! Secrets are stored as references only, never as values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::environment::Environment;
use crate::lifecycle;

/// Version given to a configuration created without one
pub const INITIAL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub name: String,
    pub environment: Environment,
    pub version: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Configuration {
    pub fn new(
        name: impl Into<String>,
        environment: Environment,
        version: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = lifecycle::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            environment,
            version: version.into(),
            data: HashMap::new(),
            secrets: HashMap::new(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
        self.updated_at = lifecycle::now();
    }

    pub fn add_secret(&mut self, key: impl Into<String>, reference: impl Into<String>) {
        self.secrets.insert(key.into(), reference.into());
        self.updated_at = lifecycle::now();
    }

    /// Derive a new version carrying over data and secret references
    pub fn new_version(&self, version: impl Into<String>, created_by: impl Into<String>) -> Self {
        let mut next = Configuration::new(self.name.clone(), self.environment, version, created_by);
        next.data = self.data.clone();
        next.secrets = self.secrets.clone();
        next
    }
}

/// `major.minor.patch` with the patch number incremented
///
/// Returns `None` for versions that are not three dot-separated integers.
pub fn next_patch_version(version: &str) -> Option<String> {
    let mut parts = version.trim().split('.');
    let (major, minor, patch) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let major: u64 = major.parse().ok()?;
    let minor: u64 = minor.parse().ok()?;
    let patch: u64 = patch.parse().ok()?;
    Some(format!("{}.{}.{}", major, minor, patch.checked_add(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_version_copies_data() {
        let mut config = Configuration::new("checkout", Environment::Prod, "1", "alice");
        config.add_data("replicas", "3");
        config.add_secret("db_password", "vault:secret/checkout/db");

        let next = config.new_version("2", "bob");

        assert_ne!(next.id, config.id);
        assert_eq!(next.name, "checkout");
        assert_eq!(next.environment, Environment::Prod);
        assert_eq!(next.version, "2");
        assert_eq!(next.created_by, "bob");
        assert_eq!(next.data, config.data);
        assert_eq!(next.secrets, config.secrets);
    }

    #[test]
    fn test_next_patch_version() {
        assert_eq!(next_patch_version(INITIAL_VERSION).as_deref(), Some("1.0.1"));
        assert_eq!(next_patch_version("2.13.9").as_deref(), Some("2.13.10"));
        assert_eq!(next_patch_version("1.0"), None);
        assert_eq!(next_patch_version("1.0.0.0"), None);
        assert_eq!(next_patch_version("v1.0.0"), None);
        assert_eq!(next_patch_version("1.0.x"), None);
    }

    #[test]
    fn test_new_version_is_independent() {
        let config = Configuration::new("checkout", Environment::Dev, "1", "alice");
        let mut next = config.new_version("2", "alice");
        next.add_data("replicas", "5");
        assert!(config.data.is_empty());
    }
}
