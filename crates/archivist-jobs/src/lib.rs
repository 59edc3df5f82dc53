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

//! Archive job handling on top of an at-least-once message feed.
//!
//! Layout: `job.rs` (payload parsing), `consumer.rs` (move, index, classify),
//! `feed.rs` (message source seam), `channel.rs` (in-process feed),
//! `worker.rs` (bounded subscription loop), `error.rs` (job errors).

pub mod channel;
pub mod consumer;
pub mod error;
pub mod feed;
pub mod job;
pub mod worker;

pub use channel::{ChannelFeed, FeedStats};
pub use consumer::{JobConsumer, Outcome};
pub use error::{JobError, JobResult};
pub use feed::{Acknowledger, Delivery, Disposition, JobFeed};
pub use job::{ArchiveJob, ArchiveReceipt};
pub use worker::{JobWorker, WorkerSummary};
