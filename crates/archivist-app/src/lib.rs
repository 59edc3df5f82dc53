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

//! Archivist application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (composition root and lifecycle), `cli.rs`
//! (command-line surface), `error.rs` (application errors).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Command-line parsing and dispatch.
pub mod cli;
/// Application-level errors.
pub mod error;

pub use bootstrap::{BootstrapDependencies, resolve_host, run_app, run_with};
pub use error::{AppError, AppResult};
