//! Fallback values applied when the environment leaves a setting unset.
//!
//! # Design
//! - Centralize defaults so the loader, docs and tests agree on them.
//! - Keep time-based defaults explicit for auditability.

/// Archive domain used as the first subject segment.
pub const DOMAIN: &str = "onglai-msg";
/// Root of the live datastore tree.
pub const DATASTORE_ROOT: &str = "/datastore";
/// Root of the archivestore tree mirroring the datastore layout.
pub const ARCHIVESTORE_ROOT: &str = "/archivestore";
/// Upper bound on jobs handled concurrently by one worker.
pub const MAX_IN_FLIGHT: usize = 8;
/// Delay before a negatively acknowledged job is offered again by the in-process feed.
pub const REDELIVERY_DELAY_MS: u64 = 1_000;
/// Log level used when neither `RUST_LOG` nor the config sets one.
pub const LOG_LEVEL: &str = "info";
/// Subject template segment between the domain and the host name.
pub const SUBJECT_INFIX: &str = "archive.bucket.job";
