//! Test fixtures for temporary store trees.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Name of the ledger file, duplicated here so fixtures stay dependency-free.
const INDEX_FILE_NAME: &str = "archive.index";

/// A temporary directory holding sibling `datastore/` and `archivestore/` roots.
///
/// The tree is removed when the layout is dropped.
pub struct StoreLayout {
    temp: TempDir,
    datastore: PathBuf,
    archivestore: PathBuf,
}

impl StoreLayout {
    /// Create empty datastore and archivestore roots under a fresh temp dir.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("archivist-")
            .tempdir()
            .context("failed to create temp dir")?;
        let datastore = temp.path().join("datastore");
        let archivestore = temp.path().join("archivestore");
        fs::create_dir_all(&datastore).context("failed to create datastore root")?;
        fs::create_dir_all(&archivestore).context("failed to create archivestore root")?;
        Ok(Self {
            temp,
            datastore,
            archivestore,
        })
    }

    /// Root of the temporary tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Datastore root.
    #[must_use]
    pub fn datastore(&self) -> &Path {
        &self.datastore
    }

    /// Archivestore root.
    #[must_use]
    pub fn archivestore(&self) -> &Path {
        &self.archivestore
    }

    /// Write `contents` to `relative` under the datastore, creating parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parents cannot be written.
    pub fn write_source(&self, relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.datastore.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// The archive path a datastore-relative source maps to.
    #[must_use]
    pub fn archive_path(&self, relative: &str) -> PathBuf {
        self.archivestore.join(relative)
    }

    /// Job payload `"<sequence>:<datastore>/<relative>"`.
    #[must_use]
    pub fn payload(&self, sequence: &str, relative: &str) -> Vec<u8> {
        format!("{sequence}:{}", self.datastore.join(relative).display()).into_bytes()
    }
}

/// Lines of the ledger in `directory`, without trailing newlines.
///
/// A missing ledger yields an empty list.
///
/// # Errors
///
/// Returns an error if an existing ledger cannot be read.
pub fn ledger_lines(directory: &Path) -> Result<Vec<String>> {
    let path = directory.join(INDEX_FILE_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw.lines().map(str::to_string).collect())
}

/// Returns `true` when directory permissions actually restrict this process.
///
/// Tests that rely on permission failures skip themselves when running as a
/// privileged user.
#[cfg(unix)]
#[must_use]
pub fn permissions_enforced() -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(temp) = tempfile::tempdir() else {
        return false;
    };
    let locked = temp.path().join("locked");
    if fs::create_dir(&locked).is_err()
        || fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).is_err()
    {
        return false;
    }
    let enforced = fs::write(locked.join("probe"), b"").is_err();
    let _ = fs::set_permissions(&locked, fs::Permissions::from_mode(0o700));
    enforced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_creates_sibling_roots() -> Result<()> {
        let layout = StoreLayout::new()?;
        assert!(layout.datastore().is_dir());
        assert!(layout.archivestore().is_dir());
        assert_eq!(layout.datastore().parent(), Some(layout.root()));
        Ok(())
    }

    #[test]
    fn write_source_creates_parents_and_payload_points_at_it() -> Result<()> {
        let layout = StoreLayout::new()?;
        let path = layout.write_source("a/b/c.dat", b"payload")?;
        assert_eq!(fs::read(&path)?, b"payload");
        let payload = String::from_utf8(layout.payload("7", "a/b/c.dat"))?;
        assert_eq!(payload, format!("7:{}", path.display()));
        assert_eq!(
            layout.archive_path("a/b/c.dat"),
            layout.archivestore().join("a/b/c.dat")
        );
        Ok(())
    }

    #[test]
    fn ledger_lines_of_missing_ledger_is_empty() -> Result<()> {
        let layout = StoreLayout::new()?;
        assert!(ledger_lines(layout.archivestore())?.is_empty());
        fs::write(layout.archivestore().join(INDEX_FILE_NAME), "1:/x\n2:/y\n")?;
        assert_eq!(ledger_lines(layout.archivestore())?, vec!["1:/x", "2:/y"]);
        Ok(())
    }
}
