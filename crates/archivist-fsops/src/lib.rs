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

//! Filesystem relocation of datastore files into the archive store.
//!
//! Layout: `mover.rs` (path mapping and the rename itself), `error.rs`
//! (relocation errors and their retry classification).

pub mod error;
pub mod mover;

pub use error::{FsOpsError, FsOpsResult};
pub use mover::{ArchiveMover, Relocation};
