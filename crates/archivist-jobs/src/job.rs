//! Job payloads and receipts.

use std::path::PathBuf;

use crate::error::{JobError, JobResult};

/// One request to archive a datastore file, parsed from a message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    /// Opaque token used later to locate the archived file.
    pub sequence: String,
    /// Absolute path of the file under the datastore root.
    pub source_path: PathBuf,
}

impl ArchiveJob {
    /// Parse `<sequence>:<source_path>`, splitting on the first `:`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::MalformedPayload`] for non-UTF-8 bytes, a missing
    /// separator, an empty sequence or path, or a line break in either part.
    pub fn parse(raw: &[u8]) -> JobResult<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| JobError::MalformedPayload {
            reason: "not_utf8",
            value: None,
        })?;
        let malformed = |reason| JobError::MalformedPayload {
            reason,
            value: Some(text.to_string()),
        };
        let (sequence, path) = text.split_once(':').ok_or_else(|| malformed("missing_separator"))?;
        if sequence.is_empty() {
            return Err(malformed("empty_sequence"));
        }
        if path.is_empty() {
            return Err(malformed("empty_path"));
        }
        if text.contains(['\n', '\r']) {
            return Err(malformed("line_break"));
        }
        Ok(Self {
            sequence: sequence.to_string(),
            source_path: PathBuf::from(path),
        })
    }
}

/// What a successful job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    /// Sequence token of the job.
    pub sequence: String,
    /// Datastore path the job named.
    pub source_path: PathBuf,
    /// Where the file now lives.
    pub archive_path: PathBuf,
    /// `true` when an earlier delivery had already moved the file.
    pub replayed: bool,
    /// `true` when this call appended the ledger line.
    pub ledger_appended: bool,
}
