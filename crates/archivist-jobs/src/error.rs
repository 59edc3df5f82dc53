//! Error types for archive job handling.

use std::error::Error;

use archivist_fsops::FsOpsError;
use archivist_ledger::LedgerError;
use thiserror::Error;

/// Primary error type for archive jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload is not `<sequence>:<source_path>`.
    #[error("malformed job payload")]
    MalformedPayload {
        /// Static reason for the rejection.
        reason: &'static str,
        /// Offending payload text when it was valid UTF-8.
        value: Option<String>,
    },
    /// Moving the file into the archive store failed.
    #[error("archive relocation failed")]
    Mover {
        /// Underlying filesystem failure.
        #[source]
        source: FsOpsError,
    },
    /// Appending to the archive index failed.
    #[error("archive index update failed")]
    Ledger {
        /// Underlying ledger failure.
        #[source]
        source: LedgerError,
    },
    /// The handler panicked on the blocking pool.
    #[error("job handler panicked")]
    HandlerPanicked,
    /// The feed no longer accepts messages.
    #[error("job feed closed")]
    FeedClosed,
    /// Settling a delivery with the message source failed.
    #[error("delivery settlement failed")]
    Settlement {
        /// Disposition that could not be delivered.
        disposition: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl JobError {
    /// Whether redelivering the same payload may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::MalformedPayload { .. } => false,
            Self::Mover { source } => source.is_transient(),
            Self::Ledger { source } => source.is_transient(),
            Self::HandlerPanicked | Self::FeedClosed | Self::Settlement { .. } => true,
        }
    }
}

/// Convenience alias for job results.
pub type JobResult<T> = Result<T, JobError>;
