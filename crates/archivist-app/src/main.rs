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

//! Binary entrypoint for the archival worker and its helper commands.

use std::process;

/// Runs the requested command and exits with its status.
#[tokio::main]
async fn main() {
    let exit_code = archivist_app::cli::run().await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
