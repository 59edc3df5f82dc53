//! Archive job handler.
//!
//! # Design
//! - One relocation attempt and at most one ledger append per call; retries
//!   come only from redelivery.
//! - A redelivered job whose file is already archived is reconciled: the
//!   ledger line is written if it is missing, and the job succeeds.
//! - Every outcome is logged, counted, and published on the event bus.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use archivist_config::PermanentFailurePolicy;
use archivist_events::{Event, EventBus};
use archivist_fsops::ArchiveMover;
use archivist_ledger::{INDEX_FILE_NAME, IndexLedger, Recording};
use archivist_telemetry::Metrics;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::feed::Disposition;
use crate::job::{ArchiveJob, ArchiveReceipt};

const HEALTH_COMPONENT: &str = "archiver";

/// Result of handling one payload.
#[derive(Debug)]
pub enum Outcome {
    /// The file is archived and indexed.
    Success(ArchiveReceipt),
    /// A retry may succeed.
    TransientFailure(JobError),
    /// A retry cannot succeed.
    PermanentFailure(JobError),
}

impl Outcome {
    fn from_error(error: JobError) -> Self {
        if error.is_transient() {
            Self::TransientFailure(error)
        } else {
            Self::PermanentFailure(error)
        }
    }

    /// Metric label for the outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "archived",
            Self::TransientFailure(_) => "transient",
            Self::PermanentFailure(_) => "permanent",
        }
    }
}

/// Moves datastore files into the archive store and indexes them.
pub struct JobConsumer {
    mover: ArchiveMover,
    ledger: IndexLedger,
    events: EventBus,
    metrics: Metrics,
    policy: PermanentFailurePolicy,
    health_degraded: Arc<Mutex<bool>>,
}

impl JobConsumer {
    /// Build a consumer with the default permanent-failure policy.
    ///
    /// Sources named like the ledger file are refused, so an archived file can
    /// never take the ledger's place.
    #[must_use]
    pub fn new(mover: ArchiveMover, ledger: IndexLedger, events: EventBus, metrics: Metrics) -> Self {
        Self {
            mover: mover.with_reserved_name(INDEX_FILE_NAME),
            ledger,
            events,
            metrics,
            policy: PermanentFailurePolicy::default(),
            health_degraded: Arc::new(Mutex::new(false)),
        }
    }

    /// Choose how permanent failures are acknowledged.
    #[must_use]
    pub fn with_policy(mut self, policy: PermanentFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Metrics registry this consumer reports into.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Event bus this consumer publishes on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handle one raw payload.
    pub fn handle(&self, raw_payload: &[u8]) -> Outcome {
        let _in_flight = InFlight::start(&self.metrics);
        let job = match ArchiveJob::parse(raw_payload) {
            Ok(job) => job,
            Err(error) => {
                let outcome = Outcome::PermanentFailure(error);
                self.report(None, &outcome);
                return outcome;
            }
        };
        let outcome = self.archive(&job);
        self.report(Some(&job), &outcome);
        outcome
    }

    /// Map an outcome to the acknowledgment sent back to the feed.
    #[must_use]
    pub const fn disposition(&self, outcome: &Outcome) -> Disposition {
        match outcome {
            Outcome::Success(_) => Disposition::Ack,
            Outcome::TransientFailure(_) => Disposition::Nak,
            Outcome::PermanentFailure(_) => match self.policy {
                PermanentFailurePolicy::Redeliver => Disposition::Nak,
                PermanentFailurePolicy::Drop => Disposition::Term,
            },
        }
    }

    /// Build the outcome for a handler that panicked on the blocking pool.
    #[must_use]
    pub fn panicked(&self) -> Outcome {
        let outcome = Outcome::TransientFailure(JobError::HandlerPanicked);
        self.report(None, &outcome);
        outcome
    }

    fn archive(&self, job: &ArchiveJob) -> Outcome {
        let relocation = match self.mover.relocate(&job.source_path) {
            Ok(relocation) => relocation,
            Err(source) => return Outcome::from_error(JobError::Mover { source }),
        };

        // Moved or not, another delivery of this job may already have indexed it.
        let replayed = relocation.is_replay();
        let archive_path = relocation.into_archive_path();
        let indexed = self
            .ledger
            .ensure_recorded(&archive_path, &job.sequence)
            .map(|recording| matches!(recording, Recording::Appended(_)));

        match indexed {
            Ok(ledger_appended) => {
                if ledger_appended {
                    self.metrics.inc_ledger_append();
                }
                Outcome::Success(ArchiveReceipt {
                    sequence: job.sequence.clone(),
                    source_path: job.source_path.clone(),
                    archive_path,
                    replayed,
                    ledger_appended,
                })
            }
            Err(source) => {
                // The file stays archived; the redelivery reconciles the index.
                warn!(
                    sequence = %job.sequence,
                    archive_path = %archive_path.display(),
                    "file archived but index update failed"
                );
                Outcome::from_error(JobError::Ledger { source })
            }
        }
    }

    fn report(&self, job: Option<&ArchiveJob>, outcome: &Outcome) {
        self.metrics.inc_job(outcome.label());
        let sequence = job.map(|job| job.sequence.clone());
        let source_path = job.map(|job| job.source_path.display().to_string());

        let event = match outcome {
            Outcome::Success(receipt) => {
                info!(
                    sequence = %receipt.sequence,
                    source_path = %receipt.source_path.display(),
                    archive_path = %receipt.archive_path.display(),
                    replayed = receipt.replayed,
                    "archive job completed"
                );
                self.mark_recovered();
                Event::JobArchived {
                    sequence: receipt.sequence.clone(),
                    source_path: receipt.source_path.display().to_string(),
                    archive_path: receipt.archive_path.display().to_string(),
                    replayed: receipt.replayed,
                }
            }
            Outcome::TransientFailure(err) => {
                warn!(
                    sequence = sequence.as_deref().unwrap_or_default(),
                    source_path = source_path.as_deref().unwrap_or_default(),
                    error = %err,
                    cause = ?std::error::Error::source(err).map(ToString::to_string),
                    "archive job failed; will be redelivered"
                );
                if !matches!(err, JobError::HandlerPanicked) {
                    self.mark_degraded(&err.to_string());
                }
                Event::JobFailed {
                    sequence,
                    source_path,
                    permanent: false,
                    message: err.to_string(),
                }
            }
            Outcome::PermanentFailure(err) => {
                error!(
                    sequence = sequence.as_deref().unwrap_or_default(),
                    source_path = source_path.as_deref().unwrap_or_default(),
                    error = %err,
                    policy = %self.policy,
                    "archive job rejected"
                );
                Event::JobFailed {
                    sequence,
                    source_path,
                    permanent: true,
                    message: err.to_string(),
                }
            }
        };
        self.publish_event(event);
    }

    fn publish_event(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.events.publish(event);
    }

    fn mark_degraded(&self, detail: &str) {
        let mut guard = self.lock_health_flag();
        if *guard {
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "archiver still degraded"
            );
        } else {
            *guard = true;
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "archiver degraded"
            );
            self.publish_event(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut guard = self.lock_health_flag();
        if std::mem::take(&mut *guard) {
            drop(guard);
            self.publish_event(Event::HealthChanged { degraded: vec![] });
            info!(component = HEALTH_COMPONENT, "archiver recovered");
        }
    }

    fn lock_health_flag(&self) -> MutexGuard<'_, bool> {
        match self.health_degraded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("archiver health mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

/// Keeps the in-flight gauge balanced even if the handler unwinds.
struct InFlight<'a> {
    metrics: &'a Metrics,
    started: Instant,
}

impl<'a> InFlight<'a> {
    fn start(metrics: &'a Metrics) -> Self {
        metrics.job_started();
        Self {
            metrics,
            started: Instant::now(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.job_finished(self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_test_support::StoreLayout;
    use archivist_test_support::fixtures::ledger_lines;

    fn consumer_for(layout: &StoreLayout) -> anyhow::Result<JobConsumer> {
        Ok(JobConsumer::new(
            ArchiveMover::new(layout.datastore(), layout.archivestore()),
            IndexLedger::new(),
            EventBus::with_capacity(32),
            Metrics::new()?,
        ))
    }

    async fn published_kinds(bus: &EventBus) -> Vec<&'static str> {
        let Some(last) = bus.last_event_id() else {
            return Vec::new();
        };
        let mut stream = bus.subscribe(Some(0));
        let mut kinds = Vec::new();
        while let Some(envelope) = stream.next().await {
            kinds.push(envelope.event.kind());
            if envelope.id >= last {
                break;
            }
        }
        kinds
    }

    #[test]
    fn success_moves_indexes_and_acks() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        layout.write_source("a/b/c.dat", b"x")?;
        let consumer = consumer_for(&layout)?;

        let outcome = consumer.handle(&layout.payload("42", "a/b/c.dat"));

        assert_eq!(consumer.disposition(&outcome), Disposition::Ack);
        let Outcome::Success(receipt) = outcome else {
            anyhow::bail!("expected success, got {outcome:?}");
        };
        assert!(!receipt.replayed);
        assert!(receipt.ledger_appended);
        assert_eq!(receipt.archive_path, layout.archive_path("a/b/c.dat"));
        assert_eq!(
            ledger_lines(&layout.archive_path("a/b"))?,
            vec![format!("42:{}", receipt.archive_path.display())]
        );
        let snapshot = consumer.metrics().snapshot();
        assert_eq!(snapshot.archived_total, 1);
        assert_eq!(snapshot.ledger_appends_total, 1);
        assert_eq!(snapshot.jobs_in_flight, 0);
        Ok(())
    }

    #[test]
    fn malformed_payload_follows_the_policy() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        let redeliver = consumer_for(&layout)?;
        let outcome = redeliver.handle(b"no separator here");
        assert!(matches!(
            outcome,
            Outcome::PermanentFailure(JobError::MalformedPayload { .. })
        ));
        assert_eq!(redeliver.disposition(&outcome), Disposition::Nak);

        let dropping = consumer_for(&layout)?.with_policy(PermanentFailurePolicy::Drop);
        let outcome = dropping.handle(b"no separator here");
        assert_eq!(dropping.disposition(&outcome), Disposition::Term);
        Ok(())
    }

    #[test]
    fn path_outside_datastore_is_permanent() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        let consumer = consumer_for(&layout)?;
        let outcome = consumer.handle(b"7:/etc/hostname");
        assert!(matches!(outcome, Outcome::PermanentFailure(JobError::Mover { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_is_transient_and_degrades_health() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        let consumer = consumer_for(&layout)?;
        let outcome = consumer.handle(&layout.payload("8", "ghost.dat"));

        assert!(matches!(outcome, Outcome::TransientFailure(_)));
        assert_eq!(consumer.disposition(&outcome), Disposition::Nak);
        assert_eq!(
            published_kinds(consumer.events()).await,
            vec!["health_changed", "job_failed"]
        );
        Ok(())
    }

    #[test]
    fn redelivery_after_success_does_not_duplicate() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        layout.write_source("once.dat", b"x")?;
        let consumer = consumer_for(&layout)?;
        let payload = layout.payload("5", "once.dat");

        let first = consumer.handle(&payload);
        let second = consumer.handle(&payload);

        assert!(matches!(first, Outcome::Success(_)));
        let Outcome::Success(receipt) = second else {
            anyhow::bail!("expected success, got {second:?}");
        };
        assert!(receipt.replayed);
        assert!(!receipt.ledger_appended);
        assert_eq!(ledger_lines(layout.archivestore())?.len(), 1);
        Ok(())
    }

    #[test]
    fn redelivery_after_crash_window_writes_missing_entry_once() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        // The rename happened but the process died before the ledger append.
        std::fs::write(layout.archive_path("gap.dat"), b"x")?;
        let consumer = consumer_for(&layout)?;
        let payload = layout.payload("9", "gap.dat");

        let first = consumer.handle(&payload);
        let second = consumer.handle(&payload);

        let Outcome::Success(receipt) = first else {
            anyhow::bail!("expected success, got {first:?}");
        };
        assert!(receipt.replayed);
        assert!(receipt.ledger_appended);
        assert!(matches!(second, Outcome::Success(_)));
        assert_eq!(ledger_lines(layout.archivestore())?.len(), 1);
        Ok(())
    }

    #[test]
    fn occupied_destination_is_transient_and_keeps_source() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        let source = layout.write_source("dup.dat", b"new")?;
        std::fs::write(layout.archive_path("dup.dat"), b"old")?;
        let consumer = consumer_for(&layout)?;

        let outcome = consumer.handle(&layout.payload("3", "dup.dat"));

        assert!(matches!(outcome, Outcome::TransientFailure(JobError::Mover { .. })));
        assert!(source.exists());
        assert!(ledger_lines(layout.archivestore())?.is_empty());
        Ok(())
    }

    #[test]
    fn panicked_outcome_is_transient() -> anyhow::Result<()> {
        let layout = StoreLayout::new()?;
        let consumer = consumer_for(&layout)?;
        let outcome = consumer.panicked();
        assert_eq!(consumer.disposition(&outcome), Disposition::Nak);
        assert_eq!(consumer.metrics().snapshot().transient_failures_total, 1);
        Ok(())
    }
}
