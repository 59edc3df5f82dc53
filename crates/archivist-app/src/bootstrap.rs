//! Composition root for the archival worker.
//!
//! # Design
//! - Configuration is loaded and validated once; nothing below this module
//!   reads the environment.
//! - Ledger, mover, consumer, feed and worker are built here in dependency
//!   order, and this module owns their start and stop.
//! - Only startup preconditions (configuration, logging, host identity) are
//!   fatal. Per-job failures never leave the worker.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use archivist_config::ArchiverConfig;
use archivist_events::{Event, EventBus};
use archivist_fsops::ArchiveMover;
use archivist_jobs::{ChannelFeed, JobConsumer, JobWorker, WorkerSummary};
use archivist_ledger::IndexLedger;
use archivist_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Build identifier recorded in logs; set at compile time when available.
const BUILD_SHA: &str = match option_env!("ARCHIVIST_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Dependencies required to start the archival worker.
pub struct BootstrapDependencies {
    config: ArchiverConfig,
    host: String,
    events: EventBus,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Assemble dependencies from explicit values.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics registry cannot be built.
    pub fn new(config: ArchiverConfig, host: impl Into<String>) -> AppResult<Self> {
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            host: host.into(),
            events: EventBus::new(),
            metrics,
        })
    }

    /// Construct production dependencies from the environment and the host name.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the host identity
    /// cannot be resolved.
    pub fn from_env() -> AppResult<Self> {
        let config = archivist_config::load_from_env()
            .map_err(|err| AppError::config("config.load_from_env", err))?;
        let host = resolve_host()?;
        Self::new(config, host)
    }

    /// Validated configuration.
    #[must_use]
    pub const fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    /// Host identity used in the job subject.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Event bus shared by the worker.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics registry shared by the worker.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Subject this host consumes jobs from.
    #[must_use]
    pub fn subject(&self) -> String {
        self.config.job_subject(&self.host)
    }
}

/// Resolve the host name and check that it can be used as a subject token.
///
/// # Errors
///
/// Returns [`AppError::HostIdentity`] when the name cannot be read and
/// [`AppError::HostName`] when it is not a usable token.
pub fn resolve_host() -> AppResult<String> {
    let raw = hostname::get().map_err(|source| AppError::HostIdentity { source })?;
    let host = raw.into_string().map_err(|_| AppError::HostName {
        reason: "not_utf8",
        value: None,
    })?;
    validate_host(&host)?;
    Ok(host)
}

fn validate_host(host: &str) -> AppResult<()> {
    let reason = if host.is_empty() {
        Some("empty")
    } else if host.chars().any(char::is_whitespace) {
        Some("contains_whitespace")
    } else if host.contains(['*', '>']) {
        Some("contains_wildcard")
    } else {
        None
    };
    reason.map_or(Ok(()), |reason| {
        Err(AppError::HostName {
            reason,
            value: Some(host.to_string()),
        })
    })
}

/// Entry point for the worker: load dependencies, install logging, consume
/// payload lines from stdin until EOF or a shutdown signal.
///
/// # Errors
///
/// Returns an error if dependency construction or logging installation fails.
pub async fn run_app() -> AppResult<WorkerSummary> {
    let dependencies = BootstrapDependencies::from_env()?;
    let logging = &dependencies.config.logging;
    archivist_telemetry::init_logging(&LoggingConfig {
        level: &logging.level,
        format: LogFormat::from_setting(logging.format.as_deref()),
        build_sha: BUILD_SHA,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("worker", &dependencies.subject());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_with(dependencies, stdin, shutdown_signal()).await
}

/// Boot sequence that relies entirely on injected dependencies.
///
/// Each non-empty line read from `input` is published as one job payload.
/// At EOF the feed closes, and the worker stops once queued jobs are handled.
/// When `shutdown` resolves the worker stops pulling and drains in-flight jobs.
///
/// # Errors
///
/// Returns [`AppError::Io`] when either storage root is not an accessible
/// directory.
pub async fn run_with<R, S>(
    dependencies: BootstrapDependencies,
    input: R,
    shutdown: S,
) -> AppResult<WorkerSummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    ensure_directory("datastore.inspect", &dependencies.config.datastore_root)?;
    ensure_directory("archivestore.inspect", &dependencies.config.archivestore_root)?;
    let subject = dependencies.subject();
    let BootstrapDependencies {
        config,
        host,
        events,
        metrics,
    } = dependencies;
    info!(
        subject = %subject,
        host = %host,
        datastore = %config.datastore_root.display(),
        archivestore = %config.archivestore_root.display(),
        policy = %config.worker.permanent_failures,
        "archive worker bootstrap starting"
    );

    let ledger = IndexLedger::new();
    let mover = ArchiveMover::new(
        config.datastore_root.clone(),
        config.archivestore_root.clone(),
    );
    let consumer = JobConsumer::new(mover, ledger, events.clone(), metrics.clone())
        .with_policy(config.worker.permanent_failures);
    let feed = Arc::new(ChannelFeed::new(config.worker.redelivery_delay));
    let worker = JobWorker::new(
        Arc::clone(&feed),
        Arc::new(consumer),
        config.worker.max_in_flight,
    );

    let token = worker.shutdown_token();
    let stopper = {
        let token = token.clone();
        let feed = Arc::clone(&feed);
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown => {
                    info!("shutdown requested; draining in-flight jobs");
                    feed.close();
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        })
    };
    let bridge = tokio::spawn(bridge_lines(input, Arc::clone(&feed)));

    let summary = worker.run().await;
    token.cancel();
    bridge.abort();
    if let Err(err) = stopper.await {
        warn!(error = %err, "shutdown watcher join failed");
    }

    let stats = feed.stats();
    debug!(
        published = stats.published,
        abandoned = stats.abandoned,
        "feed closed"
    );
    events.publish(Event::WorkerStopped {
        subject,
        handled: summary.handled,
    });
    metrics.inc_event("worker_stopped");
    info!(
        handled = summary.handled,
        acked = summary.acked,
        naked = summary.naked,
        termed = summary.termed,
        "archive worker shutdown complete"
    );
    Ok(summary)
}

fn ensure_directory(operation: &'static str, path: &Path) -> AppResult<()> {
    let metadata = std::fs::metadata(path).map_err(|source| AppError::Io {
        operation,
        path: Some(path.to_path_buf()),
        source,
    })?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(AppError::Io {
            operation,
            path: Some(path.to_path_buf()),
            source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        })
    }
}

async fn bridge_lines<R>(input: R, feed: Arc<ChannelFeed>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let payload = line.trim();
                if payload.is_empty() {
                    continue;
                }
                if let Err(err) = feed.publish(payload) {
                    warn!(error = %err, "dropping payload; feed closed");
                    break;
                }
            }
            Ok(None) => {
                info!("input exhausted; closing job feed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "failed to read job input; closing job feed");
                break;
            }
        }
    }
    feed.close();
}

/// Resolve when the process receives SIGINT or (on Unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
