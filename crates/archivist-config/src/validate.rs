//! Startup validation for [`ArchiverConfig`].

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::ArchiverConfig;

const SUBJECT_WILDCARDS: &[char] = &['*', '>'];

/// Check the invariants the pipeline relies on.
///
/// # Errors
///
/// Returns the first violated invariant: blank or subject-breaking domain,
/// relative roots, overlapping roots, zero concurrency, or an unknown log
/// format.
pub fn validate(config: &ArchiverConfig) -> ConfigResult<()> {
    validate_domain(&config.domain)?;
    validate_root("datastore_root", &config.datastore_root)?;
    validate_root("archivestore_root", &config.archivestore_root)?;
    ensure_disjoint(&config.datastore_root, &config.archivestore_root)?;

    if config.worker.max_in_flight == 0 {
        return Err(ConfigError::invalid(
            "max_in_flight",
            "must_be_positive",
            Some("0".to_string()),
        ));
    }

    if let Some(format) = config.logging.format.as_deref()
        && !matches!(format, "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "log_format",
            "unknown_format",
            Some(format.to_string()),
        ));
    }

    Ok(())
}

fn validate_domain(domain: &str) -> ConfigResult<()> {
    if domain.is_empty() {
        return Err(ConfigError::invalid("domain", "empty", None));
    }
    let reason = if domain.chars().any(char::is_whitespace) {
        Some("contains_whitespace")
    } else if domain.contains(SUBJECT_WILDCARDS) {
        Some("contains_wildcard")
    } else if domain.split('.').any(str::is_empty) {
        Some("empty_token")
    } else {
        None
    };
    reason.map_or(Ok(()), |reason| {
        Err(ConfigError::invalid(
            "domain",
            reason,
            Some(domain.to_string()),
        ))
    })
}

fn validate_root(field: &'static str, root: &Path) -> ConfigResult<()> {
    if !root.is_absolute() {
        return Err(ConfigError::invalid(
            field,
            "must_be_absolute",
            Some(root.display().to_string()),
        ));
    }
    if root.parent().is_none() {
        return Err(ConfigError::invalid(
            field,
            "filesystem_root_not_allowed",
            Some(root.display().to_string()),
        ));
    }
    Ok(())
}

fn ensure_disjoint(datastore: &Path, archivestore: &Path) -> ConfigResult<()> {
    if datastore.starts_with(archivestore) || archivestore.starts_with(datastore) {
        return Err(ConfigError::OverlappingRoots {
            datastore: datastore.display().to_string(),
            archivestore: archivestore.display().to_string(),
        });
    }
    Ok(())
}
