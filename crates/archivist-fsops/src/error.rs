//! # Design
//!
//! - Provide structured, constant-message errors for archive relocation.
//! - Capture operation context (paths, reasons) to make failures reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while moving a file into the archive store.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// The source path cannot be mapped into the archive store.
    #[error("fsops invalid path")]
    InvalidPath {
        /// Static reason for the rejection.
        reason: &'static str,
        /// Path that was rejected.
        path: PathBuf,
    },
    /// Creating the destination directory chain failed.
    #[error("fsops directory creation failed")]
    DirectoryCreate {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The rename itself (or the pre-rename inspection) failed.
    #[error("fsops relocation failed")]
    Relocation {
        /// Step of the relocation that failed.
        operation: &'static str,
        /// Source path of the move.
        from: PathBuf,
        /// Destination path of the move.
        to: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The archive path is already occupied while the source still exists.
    #[error("fsops destination already exists")]
    DestinationExists {
        /// Occupied archive path.
        archive_path: PathBuf,
    },
}

impl FsOpsError {
    pub(crate) fn invalid_path(reason: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::InvalidPath {
            reason,
            path: path.into(),
        }
    }

    pub(crate) fn relocation(
        operation: &'static str,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Relocation {
            operation,
            from: from.into(),
            to: to.into(),
            source,
        }
    }

    /// Whether a redelivery of the same job may succeed.
    ///
    /// Only path validation failures are permanent.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidPath { .. })
    }
}
