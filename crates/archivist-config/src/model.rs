//! Typed configuration value objects.
//!
//! The application builds one [`ArchiverConfig`] at startup and hands
//! references to the components that need it; nothing below the composition
//! root performs its own lookups.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::ConfigError;

/// Fully resolved configuration for one archival worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiverConfig {
    /// Archive domain; first segment of the job subject.
    pub domain: String,
    /// Root of the live datastore tree that jobs reference.
    pub datastore_root: PathBuf,
    /// Root of the archivestore tree that receives relocated files.
    pub archivestore_root: PathBuf,
    /// Worker loop settings.
    pub worker: WorkerConfig,
    /// Logging settings consumed by the telemetry crate.
    pub logging: LogSettings,
}

impl ArchiverConfig {
    /// Subject this host subscribes to: `<domain>.archive.bucket.job.<host>`.
    #[must_use]
    pub fn job_subject(&self, host: &str) -> String {
        format!("{}.{}.{host}", self.domain, defaults::SUBJECT_INFIX)
    }
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            domain: defaults::DOMAIN.to_string(),
            datastore_root: PathBuf::from(defaults::DATASTORE_ROOT),
            archivestore_root: PathBuf::from(defaults::ARCHIVESTORE_ROOT),
            worker: WorkerConfig::default(),
            logging: LogSettings::default(),
        }
    }
}

/// Settings for the subscription loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of jobs processed concurrently.
    pub max_in_flight: usize,
    /// Acknowledgment applied to jobs that can never succeed.
    pub permanent_failures: PermanentFailurePolicy,
    /// Delay before the in-process feed redelivers a negatively acknowledged job.
    #[serde(with = "duration_millis")]
    pub redelivery_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: defaults::MAX_IN_FLIGHT,
            permanent_failures: PermanentFailurePolicy::default(),
            redelivery_delay: Duration::from_millis(defaults::REDELIVERY_DELAY_MS),
        }
    }
}

/// What the worker tells the feed about a job that failed permanently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanentFailurePolicy {
    /// Negatively acknowledge so the feed redelivers, same as transient failures.
    #[default]
    Redeliver,
    /// Terminate the message so the feed never redelivers it.
    Drop,
}

impl PermanentFailurePolicy {
    /// Stable string form used in the environment and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redeliver => "redeliver",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for PermanentFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermanentFailurePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redeliver" | "nak" => Ok(Self::Redeliver),
            "drop" | "term" => Ok(Self::Drop),
            _ => Err(ConfigError::invalid(
                "permanent_failures",
                "unknown_policy",
                Some(value.to_string()),
            )),
        }
    }
}

/// Logging settings; `RUST_LOG` still takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default filter directive, e.g. `info` or `archivist_jobs=debug`.
    pub level: String,
    /// Output format (`json` or `pretty`); inferred from the build when unset.
    pub format: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
