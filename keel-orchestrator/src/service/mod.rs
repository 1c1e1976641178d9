//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Every transition is a read-check-mutate-write sequence run inside one
//! transaction that holds the aggregate root's row lock. A rejected transition
//! returns early and the dropped transaction rolls back, so nothing is written.

pub mod configuration;
pub mod deployment;
pub mod infrastructure;
pub mod pipeline;

// Re-export for convenience
pub use configuration as configuration_service;
pub use deployment as deployment_service;
pub use infrastructure as infrastructure_service;
pub use pipeline as pipeline_service;

use keel_core::lifecycle::{CascadePolicy, Operation, TransitionError};
use std::fmt::Display;
use thiserror::Error;

/// Number of entries returned by `recent` listings when no limit is given
pub const DEFAULT_RECENT_LIMIT: i64 = 10;

/// Upper bound for `recent` listings
pub const MAX_RECENT_LIMIT: i64 = 100;

/// Longest name, author or component version the schema stores
pub const MAX_NAME_LEN: usize = 255;

/// Longest configuration version the schema stores
pub const MAX_VERSION_LEN: usize = 100;

/// Error type shared by every service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, key: impl Display) -> Self {
        ServiceError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Validation
// =============================================================================

/// Reject blank required text fields
pub(crate) fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Reject blank text fields and ones longer than `max` characters
pub(crate) fn require_bounded(field: &str, value: &str, max: usize) -> ServiceResult<()> {
    require(field, value)?;
    let len = value.chars().count();
    if len > max {
        return Err(ServiceError::Validation(format!(
            "{} must be at most {} characters, got {}",
            field, max, len
        )));
    }
    Ok(())
}

/// Resolve the size of a `recent` listing
pub(crate) fn recent_limit(limit: Option<i64>) -> ServiceResult<i64> {
    match limit {
        None => Ok(DEFAULT_RECENT_LIMIT),
        Some(n) if (1..=MAX_RECENT_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(ServiceError::Validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_RECENT_LIMIT, n
        ))),
    }
}

/// Whether terminating a parent with `operation` settles its open children
pub(crate) fn cascades(policy: CascadePolicy, operation: Operation) -> bool {
    policy == CascadePolicy::Propagate && matches!(operation, Operation::Cancel | Operation::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("name", "checkout").is_ok());
        assert!(matches!(
            require("name", "   "),
            Err(ServiceError::Validation(msg)) if msg == "name must not be empty"
        ));
    }

    #[test]
    fn test_require_bounded_counts_characters() {
        assert!(require_bounded("name", &"a".repeat(MAX_NAME_LEN), MAX_NAME_LEN).is_ok());
        // multi-byte characters count once each
        assert!(require_bounded("name", &"é".repeat(MAX_NAME_LEN), MAX_NAME_LEN).is_ok());
        assert!(matches!(
            require_bounded("name", &"a".repeat(MAX_NAME_LEN + 1), MAX_NAME_LEN),
            Err(ServiceError::Validation(msg)) if msg == "name must be at most 255 characters, got 256"
        ));
        assert!(require_bounded("version", " ", MAX_VERSION_LEN).is_err());
    }

    #[test]
    fn test_recent_limit_bounds() {
        assert_eq!(recent_limit(None).unwrap(), DEFAULT_RECENT_LIMIT);
        assert_eq!(recent_limit(Some(25)).unwrap(), 25);
        assert!(recent_limit(Some(0)).is_err());
        assert!(recent_limit(Some(MAX_RECENT_LIMIT + 1)).is_err());
    }

    #[test]
    fn test_cascade_only_under_propagate() {
        assert!(!cascades(CascadePolicy::Manual, Operation::Cancel));
        assert!(cascades(CascadePolicy::Propagate, Operation::Cancel));
        assert!(cascades(CascadePolicy::Propagate, Operation::Fail));
        assert!(!cascades(CascadePolicy::Propagate, Operation::Complete));
        assert!(!cascades(CascadePolicy::Propagate, Operation::Start));
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::not_found("deployment", uuid::Uuid::nil());
        assert_eq!(
            err.to_string(),
            "deployment 00000000-0000-0000-0000-000000000000 not found"
        );
    }
}
