//! Configuration Service
//!
//! Business logic for versioned configurations.

use keel_core::domain::configuration::{Configuration, INITIAL_VERSION, next_patch_version};
use keel_core::domain::environment::Environment;
use keel_core::dto::configuration::{
    ConfigurationStats, CreateConfiguration, NewVersion, PatchConfiguration,
};
use keel_core::lifecycle;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    MAX_NAME_LEN, MAX_VERSION_LEN, ServiceError, ServiceResult, require, require_bounded,
};
use crate::repository::configuration_repository;

const KIND: &str = "configuration";

/// Create the first (or another) version of a configuration
pub async fn create_configuration(
    pool: &PgPool,
    req: CreateConfiguration,
) -> ServiceResult<Configuration> {
    let config = build_configuration(req)?;

    insert_new_version(pool, &config).await?;

    tracing::info!(
        "Configuration created: {} ({} {} v{})",
        config.id,
        config.name,
        config.environment,
        config.version
    );

    Ok(config)
}

/// Get a configuration by ID
pub async fn get_configuration(pool: &PgPool, id: Uuid) -> ServiceResult<Configuration> {
    configuration_repository::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(KIND, id))
}

/// Latest version of (name, environment)
pub async fn latest_configuration(
    pool: &PgPool,
    name: &str,
    environment: Environment,
) -> ServiceResult<Configuration> {
    require("name", name)?;

    configuration_repository::find_latest(pool, name, environment)
        .await?
        .ok_or_else(|| ServiceError::not_found(KIND, format!("{}/{}", name, environment)))
}

/// One specific version of (name, environment)
pub async fn configuration_version(
    pool: &PgPool,
    name: &str,
    environment: Environment,
    version: &str,
) -> ServiceResult<Configuration> {
    require("name", name)?;
    require("version", version)?;

    configuration_repository::find_version(pool, name, environment, version)
        .await?
        .ok_or_else(|| {
            ServiceError::not_found(KIND, format!("{}/{} v{}", name, environment, version))
        })
}

/// Number of configuration versions per environment
pub async fn configuration_stats(pool: &PgPool) -> ServiceResult<ConfigurationStats> {
    let counts = configuration_repository::count_by_environment(pool).await?;
    Ok(ConfigurationStats::from_counts(counts))
}

/// List configurations, optionally for one environment
pub async fn list_configurations(
    pool: &PgPool,
    environment: Option<Environment>,
) -> ServiceResult<Vec<Configuration>> {
    Ok(configuration_repository::list(pool, environment).await?)
}

/// Merge data entries and secret references into a configuration
pub async fn patch_configuration(
    pool: &PgPool,
    id: Uuid,
    req: PatchConfiguration,
) -> ServiceResult<Configuration> {
    if req.data.is_empty() && req.secrets.is_empty() {
        return Err(ServiceError::Validation(
            "nothing to merge: data and secrets are both empty".to_string(),
        ));
    }

    let config =
        configuration_repository::merge_entries(pool, id, &req.data, &req.secrets, lifecycle::now())
            .await?
            .ok_or_else(|| ServiceError::not_found(KIND, id))?;

    tracing::info!(
        "Configuration {} patched ({} data, {} secret entries)",
        id,
        req.data.len(),
        req.secrets.len()
    );

    Ok(config)
}

/// Derive a new version carrying over data and secret references
pub async fn new_configuration_version(
    pool: &PgPool,
    id: Uuid,
    req: NewVersion,
) -> ServiceResult<Configuration> {
    let current = get_configuration(pool, id).await?;
    let next = derive_version(&current, req)?;

    insert_new_version(pool, &next).await?;

    tracing::info!(
        "Configuration {} {}: version {} derived from {}",
        next.name,
        next.environment,
        next.version,
        current.version
    );

    Ok(next)
}

/// Delete a configuration version
pub async fn delete_configuration(pool: &PgPool, id: Uuid) -> ServiceResult<()> {
    if !configuration_repository::delete(pool, id).await? {
        return Err(ServiceError::not_found(KIND, id));
    }

    tracing::info!("Configuration {} deleted", id);
    Ok(())
}

/// Delete every version of (name, environment)
pub async fn delete_all_versions(
    pool: &PgPool,
    name: &str,
    environment: Environment,
) -> ServiceResult<u64> {
    require("name", name)?;

    let deleted = configuration_repository::delete_all_versions(pool, name, environment).await?;
    if deleted == 0 {
        return Err(ServiceError::not_found(KIND, format!("{}/{}", name, environment)));
    }

    tracing::info!("Configuration {} {}: {} versions deleted", name, environment, deleted);
    Ok(deleted)
}

// =============================================================================
// Validation
// =============================================================================

fn build_configuration(req: CreateConfiguration) -> ServiceResult<Configuration> {
    let version = req.version.unwrap_or_else(|| INITIAL_VERSION.to_string());
    require_bounded("name", &req.name, MAX_NAME_LEN)?;
    require_bounded("version", &version, MAX_VERSION_LEN)?;
    require_bounded("created_by", &req.created_by, MAX_NAME_LEN)?;

    let mut config = Configuration::new(req.name, req.environment, version, req.created_by);
    config.data = req.data;
    config.secrets = req.secrets;
    Ok(config)
}

// Without an explicit version the patch number of the source is bumped
fn derive_version(current: &Configuration, req: NewVersion) -> ServiceResult<Configuration> {
    let version = match req.version {
        Some(version) => version,
        None => next_patch_version(&current.version).ok_or_else(|| {
            ServiceError::Validation(format!(
                "version is required: '{}' is not major.minor.patch",
                current.version
            ))
        })?,
    };
    require_bounded("version", &version, MAX_VERSION_LEN)?;
    require_bounded("created_by", &req.created_by, MAX_NAME_LEN)?;

    Ok(current.new_version(version, req.created_by))
}

// (name, environment, version) is unique; a duplicate is a caller error
async fn insert_new_version(pool: &PgPool, config: &Configuration) -> ServiceResult<()> {
    match configuration_repository::insert(pool, config).await {
        Ok(()) => Ok(()),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            Err(ServiceError::Validation(format!(
                "configuration {} {} already has version {}",
                config.name, config.environment, config.version
            )))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(version: Option<&str>) -> CreateConfiguration {
        CreateConfiguration {
            name: "checkout".to_string(),
            environment: Environment::Staging,
            version: version.map(str::to_string),
            created_by: "alice".to_string(),
            data: HashMap::from([("replicas".to_string(), "3".to_string())]),
            secrets: HashMap::new(),
        }
    }

    fn next(version: Option<&str>) -> NewVersion {
        NewVersion {
            version: version.map(str::to_string),
            created_by: "bob".to_string(),
        }
    }

    #[test]
    fn test_build_configuration_defaults_version() {
        let config = build_configuration(request(None)).unwrap();
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.data["replicas"], "3");

        let config = build_configuration(request(Some("2024.1"))).unwrap();
        assert_eq!(config.version, "2024.1");
    }

    #[test]
    fn test_build_configuration_rejects_overlong_version() {
        let long = "9".repeat(MAX_VERSION_LEN + 1);
        assert!(matches!(
            build_configuration(request(Some(&long))),
            Err(ServiceError::Validation(msg)) if msg.starts_with("version must be at most 100")
        ));
        assert!(build_configuration(request(Some(" "))).is_err());
    }

    #[test]
    fn test_derive_version_bumps_patch() {
        let current = build_configuration(request(Some("1.4.9"))).unwrap();

        let derived = derive_version(&current, next(None)).unwrap();
        assert_eq!(derived.version, "1.4.10");
        assert_eq!(derived.created_by, "bob");
        assert_eq!(derived.data, current.data);

        let explicit = derive_version(&current, next(Some("2.0.0"))).unwrap();
        assert_eq!(explicit.version, "2.0.0");
    }

    #[test]
    fn test_derive_version_needs_semver_source() {
        let current = build_configuration(request(Some("blue"))).unwrap();
        assert!(matches!(
            derive_version(&current, next(None)),
            Err(ServiceError::Validation(msg)) if msg.contains("'blue'")
        ));
        assert!(derive_version(&current, next(Some("green"))).is_ok());
    }
}
