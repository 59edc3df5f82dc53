//! Environment-backed configuration loader.
//!
//! # Design
//! - Resolve every key through an injectable lookup so tests never mutate the
//!   process environment.
//! - Blank values count as unset; malformed values are errors, not silent fallbacks.
//! - Validate once, after all overrides are applied.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ArchiverConfig, PermanentFailurePolicy};
use crate::validate::validate;

/// Archive domain variable.
pub const ENV_DOMAIN: &str = "ARCHIVIST_DOMAIN";
/// Datastore root variable.
pub const ENV_DATASTORE: &str = "ARCHIVIST_DATASTORE";
/// Archivestore root variable.
pub const ENV_ARCHIVESTORE: &str = "ARCHIVIST_ARCHIVESTORE";
/// Worker concurrency variable.
pub const ENV_MAX_IN_FLIGHT: &str = "ARCHIVIST_MAX_IN_FLIGHT";
/// Permanent failure policy variable.
pub const ENV_PERMANENT_FAILURES: &str = "ARCHIVIST_PERMANENT_FAILURES";
/// Redelivery delay variable, in milliseconds.
pub const ENV_REDELIVERY_DELAY_MS: &str = "ARCHIVIST_REDELIVERY_DELAY_MS";
/// Log level variable.
pub const ENV_LOG_LEVEL: &str = "ARCHIVIST_LOG_LEVEL";
/// Log format variable.
pub const ENV_LOG_FORMAT: &str = "ARCHIVIST_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns an error when a variable is malformed or the resulting
/// configuration fails validation.
pub fn load_from_env() -> ConfigResult<ArchiverConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration using `lookup` to resolve each variable.
///
/// # Errors
///
/// Returns an error when a variable is malformed or the resulting
/// configuration fails validation.
pub fn load_with<F>(lookup: F) -> ConfigResult<ArchiverConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let mut config = ArchiverConfig::default();

    if let Some(domain) = read(ENV_DOMAIN) {
        config.domain = domain;
    }
    if let Some(root) = read(ENV_DATASTORE) {
        config.datastore_root = PathBuf::from(root);
    }
    if let Some(root) = read(ENV_ARCHIVESTORE) {
        config.archivestore_root = PathBuf::from(root);
    }
    if let Some(raw) = read(ENV_MAX_IN_FLIGHT) {
        config.worker.max_in_flight = parse_number("max_in_flight", &raw)?;
    }
    if let Some(raw) = read(ENV_PERMANENT_FAILURES) {
        config.worker.permanent_failures = raw.parse::<PermanentFailurePolicy>()?;
    }
    if let Some(raw) = read(ENV_REDELIVERY_DELAY_MS) {
        let millis: u64 = parse_number("redelivery_delay_ms", &raw)?;
        config.worker.redelivery_delay = Duration::from_millis(millis);
    }
    if let Some(level) = read(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(format) = read(ENV_LOG_FORMAT) {
        config.logging.format = Some(format.to_ascii_lowercase());
    }

    validate(&config)?;
    Ok(config)
}

fn parse_number<T: FromStr>(field: &'static str, raw: &str) -> ConfigResult<T> {
    raw.parse::<T>()
        .map_err(|_| ConfigError::invalid(field, "not_a_number", Some(raw.to_string())))
}
