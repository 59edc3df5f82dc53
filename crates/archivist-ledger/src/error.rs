//! # Design
//!
//! - Provide structured, constant-message errors for ledger reads and appends.
//! - Capture the operation and ledger path without interpolating them into messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors produced while reading or appending archive index ledgers.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Opening, locking, writing or syncing the ledger failed.
    #[error("ledger write failed")]
    Write {
        /// Step of the append sequence that failed.
        operation: &'static str,
        /// Ledger file involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Reading an existing ledger failed.
    #[error("ledger read failed")]
    Read {
        /// Ledger file involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The archive path has no parent directory to hold a ledger.
    #[error("archive path has no parent directory")]
    NoParent {
        /// Archive path that was rejected.
        path: PathBuf,
    },
    /// The archive path cannot be written as UTF-8 ledger text.
    #[error("archive path is not valid utf-8")]
    NonUtf8Path {
        /// Archive path that was rejected.
        path: PathBuf,
    },
    /// The sequence token cannot be written as a ledger key.
    #[error("invalid sequence token")]
    InvalidSequence {
        /// Static reason for the rejection.
        reason: &'static str,
        /// Offending token.
        value: String,
    },
}

impl LedgerError {
    pub(crate) fn write(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the failure may clear up on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Read { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn write_helper_preserves_source_and_context() {
        let err = LedgerError::write("sync", "/archive/archive.index", io::Error::other("disk"));
        assert_eq!(err.to_string(), "ledger write failed");
        assert!(err.source().is_some());
        assert!(err.is_transient());
        assert!(matches!(
            err,
            LedgerError::Write {
                operation: "sync",
                ..
            }
        ));
    }

    #[test]
    fn input_errors_are_not_transient() {
        let err = LedgerError::InvalidSequence {
            reason: "contains_separator",
            value: "a:b".into(),
        };
        assert!(!err.is_transient());
        assert!(!LedgerError::NoParent { path: "/".into() }.is_transient());
    }
}
