//! Error types for configuration operations.
//!
//! # Design
//! - Constant messages; the offending field, reason and value travel as data.
//! - Every variant is a startup failure, never a per-job one.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Datastore and archivestore roots overlap.
    #[error("overlapping storage roots")]
    OverlappingRoots {
        /// Configured datastore root.
        datastore: String,
        /// Configured archivestore root.
        archivestore: String,
    },
}

impl ConfigError {
    pub(crate) const fn invalid(
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::InvalidField {
            field,
            reason,
            value,
        }
    }

    /// Field name associated with the failure, when the error concerns one field.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidField { field, .. } => Some(*field),
            Self::OverlappingRoots { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_helper_builds_field_variant() {
        let err = ConfigError::invalid("domain", "empty", None);
        assert_eq!(err.field(), Some("domain"));
        assert_eq!(err.to_string(), "invalid configuration field");
    }

    #[test]
    fn overlapping_roots_has_no_single_field() {
        let err = ConfigError::OverlappingRoots {
            datastore: "/data".into(),
            archivestore: "/data/archive".into(),
        };
        assert!(err.field().is_none());
    }
}
