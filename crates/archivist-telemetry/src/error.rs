//! # Design
//!
//! - One error type for logging installation and the metrics registry.
//! - Messages stay constant; the failing operation and metric name travel as fields.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while wiring logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global tracing subscriber could not be installed.
    #[error("tracing subscriber installation failed")]
    SubscriberInstall {
        /// Underlying subscriber error; usually a subscriber was already set.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A worker collector could not be built or registered.
    #[error("metrics collector setup failed")]
    Collector {
        /// Step that failed (`build` or `register`).
        operation: &'static str,
        /// Metric family name.
        metric: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be rendered as exposition text.
    #[error("metrics rendering failed")]
    Render {
        /// Step that failed (`encode` or `utf8`).
        operation: &'static str,
        /// Underlying encoder or conversion error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TelemetryError {
    pub(crate) fn collector(
        operation: &'static str,
        metric: &'static str,
    ) -> impl FnOnce(prometheus::Error) -> Self {
        move |source| Self::Collector {
            operation,
            metric,
            source,
        }
    }

    pub(crate) fn render<E>(operation: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| Self::Render {
            operation,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn collector_errors_keep_the_metric_name() {
        let err = TelemetryError::collector("register", "archive_jobs_total")(
            prometheus::Error::AlreadyReg,
        );
        assert!(matches!(
            err,
            TelemetryError::Collector {
                operation: "register",
                metric: "archive_jobs_total",
                ..
            }
        ));
        assert_eq!(err.to_string(), "metrics collector setup failed");
        assert!(err.source().is_some());
    }

    #[test]
    fn render_errors_box_the_cause() {
        let utf8 = String::from_utf8(vec![0xff]).map(|_| ());
        let err = utf8
            .map_err(TelemetryError::render("utf8"))
            .expect_err("invalid bytes should fail");
        assert!(matches!(err, TelemetryError::Render { operation: "utf8", .. }));
        assert_eq!(err.to_string(), "metrics rendering failed");
        assert!(err.source().is_some());
    }
}
