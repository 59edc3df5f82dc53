//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the archival worker reports on.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the worker.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    archive_jobs_total: IntCounterVec,
    archive_settlements_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    ledger_appends_total: IntCounter,
    jobs_in_flight: IntGauge,
    last_job_latency_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Jobs that ended with the file in the archive store.
    pub archived_total: u64,
    /// Jobs that failed with a retryable error.
    pub transient_failures_total: u64,
    /// Jobs that failed with a non-retryable error.
    pub permanent_failures_total: u64,
    /// Lines appended to archive index ledgers.
    pub ledger_appends_total: u64,
    /// Jobs currently being processed.
    pub jobs_in_flight: i64,
    /// Wall-clock time (ms) spent on the most recent job.
    pub last_job_latency_ms: i64,
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(TelemetryError::collector("register", name))
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let archive_jobs_total = IntCounterVec::new(
            Opts::new("archive_jobs_total", "Archive jobs handled by outcome"),
            &["outcome"],
        )
        .map_err(TelemetryError::collector("build", "archive_jobs_total"))?;
        let archive_settlements_total = IntCounterVec::new(
            Opts::new(
                "archive_settlements_total",
                "Deliveries settled with the message source by disposition",
            ),
            &["disposition"],
        )
        .map_err(TelemetryError::collector("build", "archive_settlements_total"))?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )
        .map_err(TelemetryError::collector("build", "events_emitted_total"))?;
        let ledger_appends_total = IntCounter::with_opts(Opts::new(
            "ledger_appends_total",
            "Entries appended to archive index ledgers",
        ))
        .map_err(TelemetryError::collector("build", "ledger_appends_total"))?;
        let jobs_in_flight =
            IntGauge::with_opts(Opts::new("jobs_in_flight", "Archive jobs currently running"))
                .map_err(TelemetryError::collector("build", "jobs_in_flight"))?;
        let last_job_latency_ms = IntGauge::with_opts(Opts::new(
            "last_job_latency_ms",
            "Time taken by the most recent archive job (ms)",
        ))
        .map_err(TelemetryError::collector("build", "last_job_latency_ms"))?;

        register(&registry, "archive_jobs_total", &archive_jobs_total)?;
        register(
            &registry,
            "archive_settlements_total",
            &archive_settlements_total,
        )?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "ledger_appends_total", &ledger_appends_total)?;
        register(&registry, "jobs_in_flight", &jobs_in_flight)?;
        register(&registry, "last_job_latency_ms", &last_job_latency_ms)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                archive_jobs_total,
                archive_settlements_total,
                events_emitted_total,
                ledger_appends_total,
                jobs_in_flight,
                last_job_latency_ms,
            }),
        })
    }

    /// Increment the job counter for the given outcome label
    /// (`archived`, `transient`, `permanent`).
    pub fn inc_job(&self, outcome: &str) {
        self.inner
            .archive_jobs_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the settlement counter (`ack`, `nak`, `term`).
    pub fn inc_settlement(&self, disposition: &str) {
        self.inner
            .archive_settlements_total
            .with_label_values(&[disposition])
            .inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Increment the ledger append counter.
    pub fn inc_ledger_append(&self) {
        self.inner.ledger_appends_total.inc();
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        self.inner.jobs_in_flight.inc();
    }

    /// Mark a job as finished and record how long it took.
    pub fn job_finished(&self, elapsed: Duration) {
        self.inner.jobs_in_flight.dec();
        self.inner
            .last_job_latency_ms
            .set(Self::duration_to_ms(elapsed));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(TelemetryError::render("encode"))?;
        String::from_utf8(buffer).map_err(TelemetryError::render("utf8"))
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let jobs = &self.inner.archive_jobs_total;
        MetricsSnapshot {
            archived_total: jobs.with_label_values(&["archived"]).get(),
            transient_failures_total: jobs.with_label_values(&["transient"]).get(),
            permanent_failures_total: jobs.with_label_values(&["permanent"]).get(),
            ledger_appends_total: self.inner.ledger_appends_total.get(),
            jobs_in_flight: self.inner.jobs_in_flight.get(),
            last_job_latency_ms: self.inner.last_job_latency_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}
