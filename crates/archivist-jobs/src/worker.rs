//! Subscription loop.
//!
//! # Design
//! - A permit from a semaphore sized to `max_in_flight` is taken before each
//!   pull, so at most that many deliveries are held at once.
//! - The consumer runs on the blocking pool; the delivery is settled back on
//!   the async side once it returns.
//! - On cancellation the loop stops pulling and awaits every in-flight job
//!   before returning. There is no per-job timeout.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::consumer::JobConsumer;
use crate::feed::{Delivery, Disposition, JobFeed};

/// Counters returned when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Deliveries handled to completion.
    pub handled: u64,
    /// Deliveries settled with ack.
    pub acked: u64,
    /// Deliveries settled with nak.
    pub naked: u64,
    /// Deliveries settled with term.
    pub termed: u64,
    /// Settlements the feed rejected.
    pub settle_failures: u64,
}

impl WorkerSummary {
    fn record(&mut self, report: JobReport) {
        self.handled += 1;
        match report.disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Nak => self.naked += 1,
            Disposition::Term => self.termed += 1,
        }
        if !report.settled {
            self.settle_failures += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct JobReport {
    disposition: Disposition,
    settled: bool,
}

/// Pulls deliveries from a feed and hands them to a [`JobConsumer`].
pub struct JobWorker<F> {
    feed: Arc<F>,
    consumer: Arc<JobConsumer>,
    max_in_flight: usize,
    shutdown: CancellationToken,
}

impl<F> JobWorker<F>
where
    F: JobFeed + 'static,
{
    /// Build a worker. A zero `max_in_flight` is raised to one.
    #[must_use]
    pub fn new(feed: Arc<F>, consumer: Arc<JobConsumer>, max_in_flight: usize) -> Self {
        Self {
            feed,
            consumer,
            max_in_flight: max_in_flight.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the subscription loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the token is cancelled or the feed closes, then drain.
    pub async fn run(self) -> WorkerSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut summary = WorkerSummary::default();
        info!(max_in_flight = self.max_in_flight, "archive worker started");

        loop {
            while let Some(joined) = tasks.try_join_next() {
                Self::collect(&mut summary, joined);
            }

            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                delivery = self.feed.next_delivery() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        info!("job feed closed");
                        break;
                    }
                },
            };

            let span = info_span!("archive_job", attempt = delivery.attempt());
            let consumer = Arc::clone(&self.consumer);
            tasks.spawn(
                async move {
                    let report = process(consumer, delivery).await;
                    drop(permit);
                    report
                }
                .instrument(span),
            );
        }

        let draining = tasks.len();
        if draining > 0 {
            info!(in_flight = draining, "draining in-flight jobs");
        }
        while let Some(joined) = tasks.join_next().await {
            Self::collect(&mut summary, joined);
        }
        info!(
            handled = summary.handled,
            acked = summary.acked,
            naked = summary.naked,
            termed = summary.termed,
            "archive worker stopped"
        );
        summary
    }

    fn collect(summary: &mut WorkerSummary, joined: Result<JobReport, JoinError>) {
        match joined {
            Ok(report) => summary.record(report),
            Err(err) => error!(error = %err, "job task failed before settling"),
        }
    }
}

async fn process(consumer: Arc<JobConsumer>, delivery: Delivery) -> JobReport {
    let (payload, acker) = delivery.into_parts();
    let handler = Arc::clone(&consumer);
    let span = tracing::Span::current();
    let outcome = match tokio::task::spawn_blocking(move || {
        span.in_scope(|| handler.handle(&payload))
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "archive handler panicked");
            consumer.panicked()
        }
    };

    let disposition = consumer.disposition(&outcome);
    consumer.metrics().inc_settlement(disposition.as_str());
    let settled = match acker.settle(disposition).await {
        Ok(()) => {
            debug!(disposition = disposition.as_str(), "delivery settled");
            true
        }
        Err(err) => {
            warn!(
                disposition = disposition.as_str(),
                error = %err,
                "failed to settle delivery; the source will redeliver"
            );
            false
        }
    };
    JobReport {
        disposition,
        settled,
    }
}
