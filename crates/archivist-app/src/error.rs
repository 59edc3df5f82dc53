//! # Design
//!
//! - Centralize application-level errors for bootstrap and the command line.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The host name could not be read from the operating system.
    #[error("host identity unavailable")]
    HostIdentity {
        /// Source IO error.
        source: io::Error,
    },
    /// The host name cannot be used as a subject token.
    #[error("host identity unusable")]
    HostName {
        /// Machine-readable reason for the rejection.
        reason: &'static str,
        /// Offending host name when it was valid UTF-8.
        value: Option<String>,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: archivist_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: archivist_telemetry::TelemetryError,
    },
    /// Ledger reads failed.
    #[error("ledger operation failed")]
    Ledger {
        /// Operation identifier.
        operation: &'static str,
        /// Source ledger error.
        source: archivist_ledger::LedgerError,
    },
    /// Rendering output failed.
    #[error("output serialization failed")]
    Serialize {
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: archivist_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: archivist_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn ledger(
        operation: &'static str,
        source: archivist_ledger::LedgerError,
    ) -> Self {
        Self::Ledger { operation, source }
    }

    /// Process exit code reported for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::HostIdentity { .. } | Self::HostName { .. } => 3,
            _ => 1,
        }
    }
}
