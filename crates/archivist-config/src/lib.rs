#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Resolved configuration for the archival worker.
//!
//! Layout: `model.rs` (typed config value objects), `loader.rs` (environment
//! resolution), `validate.rs` (invariants checked once at startup),
//! `defaults.rs` (fallback values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_env, load_with};
pub use model::{ArchiverConfig, LogSettings, PermanentFailurePolicy, WorkerConfig};
pub use validate::validate;
