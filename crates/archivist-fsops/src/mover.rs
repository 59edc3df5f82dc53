//! Datastore to archivestore relocation.
//!
//! # Design
//! - The archive path is the source path with the datastore root swapped for
//!   the archivestore root; everything below the root is preserved.
//! - A relocation is exactly one `rename(2)`. There is no copy fallback, so a
//!   cross-device layout surfaces as a retryable error instead of a slow copy.
//! - The mover never overwrites an archived file.

use std::ffi::OsString;
use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FsOpsError, FsOpsResult};

#[cfg(unix)]
const ARCHIVE_DIR_MODE: u32 = 0o750;

/// Result of a successful [`ArchiveMover::relocate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// The file was renamed into the archive store by this call.
    Moved(PathBuf),
    /// The source was gone and the archive path already held the file; no
    /// filesystem mutation was made.
    AlreadyArchived(PathBuf),
}

impl Relocation {
    /// Archive path of the file.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        match self {
            Self::Moved(path) | Self::AlreadyArchived(path) => path,
        }
    }

    /// Consume the relocation, keeping the archive path.
    #[must_use]
    pub fn into_archive_path(self) -> PathBuf {
        match self {
            Self::Moved(path) | Self::AlreadyArchived(path) => path,
        }
    }

    /// Whether an earlier delivery had already moved the file.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::AlreadyArchived(_))
    }
}

/// Maps datastore paths into the archive store and moves files there.
#[derive(Debug, Clone)]
pub struct ArchiveMover {
    datastore_root: PathBuf,
    archivestore_root: PathBuf,
    reserved_names: Vec<OsString>,
}

impl ArchiveMover {
    /// Build a mover for the given (validated, absolute) roots.
    #[must_use]
    pub fn new(datastore_root: impl Into<PathBuf>, archivestore_root: impl Into<PathBuf>) -> Self {
        Self {
            datastore_root: datastore_root.into(),
            archivestore_root: archivestore_root.into(),
            reserved_names: Vec::new(),
        }
    }

    /// Refuse sources with a path component called `name` below the
    /// datastore root, e.g. the file name the archive store keeps its index in.
    #[must_use]
    pub fn with_reserved_name(mut self, name: impl Into<OsString>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    /// Root that job paths must live under.
    #[must_use]
    pub fn datastore_root(&self) -> &Path {
        &self.datastore_root
    }

    /// Root that archived files are moved under.
    #[must_use]
    pub fn archivestore_root(&self) -> &Path {
        &self.archivestore_root
    }

    /// Archive path for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidPath`] when `source` is relative, contains
    /// `..`, is the datastore root itself, lies outside it, or names a reserved
    /// file. Matching is by path component, so `/datastore2/x` is not under
    /// `/datastore`.
    pub fn archive_path_for(&self, source: &Path) -> FsOpsResult<PathBuf> {
        if !source.is_absolute() {
            return Err(FsOpsError::invalid_path("not_absolute", source));
        }
        if source
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(FsOpsError::invalid_path("parent_traversal", source));
        }
        let suffix = source
            .strip_prefix(&self.datastore_root)
            .map_err(|_| FsOpsError::invalid_path("outside_datastore", source))?;
        if suffix.as_os_str().is_empty() {
            return Err(FsOpsError::invalid_path("datastore_root", source));
        }
        let reserved = |component: Component<'_>| {
            self.reserved_names
                .iter()
                .any(|name| component.as_os_str() == name.as_os_str())
        };
        if suffix.components().any(reserved) {
            return Err(FsOpsError::invalid_path("reserved_name", source));
        }
        Ok(self.archivestore_root.join(suffix))
    }

    /// Move `source` to its archive path.
    ///
    /// # Errors
    ///
    /// - [`FsOpsError::InvalidPath`] when the path cannot be mapped; nothing is touched.
    /// - [`FsOpsError::DirectoryCreate`] when the destination directories cannot
    ///   be created; the rename is not attempted.
    /// - [`FsOpsError::DestinationExists`] when both the source and the archive
    ///   path exist.
    /// - [`FsOpsError::Relocation`] when the rename fails (missing source,
    ///   permissions, cross-device).
    pub fn relocate(&self, source: &Path) -> FsOpsResult<Relocation> {
        let archive_path = self.archive_path_for(source)?;
        let parent = archive_path
            .parent()
            .ok_or_else(|| FsOpsError::invalid_path("no_parent", &archive_path))?;
        create_archive_dirs(parent)?;

        let source_present = exists_no_follow(source)
            .map_err(|err| FsOpsError::relocation("inspect_source", source, &archive_path, err))?;
        let archived_present = exists_no_follow(&archive_path).map_err(|err| {
            FsOpsError::relocation("inspect_destination", source, &archive_path, err)
        })?;

        match (source_present, archived_present) {
            (true, true) => Err(FsOpsError::DestinationExists { archive_path }),
            (false, true) => {
                info!(
                    source_path = %source.display(),
                    archive_path = %archive_path.display(),
                    "source already archived; skipping rename"
                );
                Ok(Relocation::AlreadyArchived(archive_path))
            }
            _ => {
                fs::rename(source, &archive_path).map_err(|err| {
                    FsOpsError::relocation("rename", source, &archive_path, err)
                })?;
                debug!(
                    source_path = %source.display(),
                    archive_path = %archive_path.display(),
                    "file relocated"
                );
                Ok(Relocation::Moved(archive_path))
            }
        }
    }
}

fn create_archive_dirs(directory: &Path) -> FsOpsResult<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(ARCHIVE_DIR_MODE);
    }
    builder
        .create(directory)
        .map_err(|source| FsOpsError::DirectoryCreate {
            path: directory.to_path_buf(),
            source,
        })
}

fn exists_no_follow(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
