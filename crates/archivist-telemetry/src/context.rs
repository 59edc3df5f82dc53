//! Process-wide span carrying the worker identity.

use tracing::span::EnteredSpan;

use crate::init::build_sha;

/// Keeps the `archivist` span entered until dropped, so every log line
/// carries the run mode, the job subject and the build identifier.
pub struct GlobalContextGuard {
    _span: EnteredSpan,
}

impl GlobalContextGuard {
    /// Enter the process span for `mode` (e.g. `worker`) consuming `subject`.
    #[must_use]
    pub fn new(mode: &str, subject: &str) -> Self {
        let span = tracing::info_span!(
            "archivist",
            mode,
            subject,
            build_sha = build_sha(),
        );
        Self {
            _span: span.entered(),
        }
    }
}
