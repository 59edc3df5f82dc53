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

//! Append-only index ledgers that map sequence tokens to archived files.
//!
//! Every archive directory carries one `archive.index` file. Each successful
//! archival appends a single `<sequence>:<archive_path>` line; lines are never
//! rewritten or removed.

pub mod entry;
pub mod error;
pub mod ledger;

pub use entry::IndexEntry;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{INDEX_FILE_NAME, IndexLedger, Recording, index_path_for};
