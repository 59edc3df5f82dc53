//! Per-directory ledger appends and lookups.
//!
//! # Design
//! - Appends for one ledger file are serialized twice: an in-process mutex
//!   keyed by ledger path, then an advisory exclusive `fs2` lock for writers in
//!   other processes.
//! - A path's mutex lives in the registry only while some append holds or
//!   waits on it.
//! - Each append is a single `write_all` followed by `sync_all`; a failed
//!   append truncates the file back to its previous length.
//! - Readers ignore a trailing line without a newline.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::entry::IndexEntry;
use crate::error::{LedgerError, LedgerResult};

/// File name of the ledger kept in every archive directory.
pub const INDEX_FILE_NAME: &str = "archive.index";

#[cfg(unix)]
const LEDGER_MODE: u32 = 0o644;

/// Ledger path for an archived file: `archive.index` beside it.
///
/// # Errors
///
/// Returns [`LedgerError::NoParent`] when the path has no parent directory.
pub fn index_path_for(archive_name: &Path) -> LedgerResult<PathBuf> {
    match archive_name.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.join(INDEX_FILE_NAME)),
        _ => Err(LedgerError::NoParent {
            path: archive_name.to_path_buf(),
        }),
    }
}

/// Result of [`IndexLedger::ensure_recorded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recording {
    /// A new line was appended.
    Appended(IndexEntry),
    /// An identical entry was already present; nothing was written.
    AlreadyPresent(IndexEntry),
}

impl Recording {
    /// The entry regardless of whether it was written now.
    #[must_use]
    pub const fn entry(&self) -> &IndexEntry {
        match self {
            Self::Appended(entry) | Self::AlreadyPresent(entry) => entry,
        }
    }
}

/// Handle to the archive index ledgers. Cheap to clone; clones share locks.
#[derive(Debug, Clone, Default)]
pub struct IndexLedger {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl IndexLedger {
    /// Construct a ledger handle with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `<sequence>:<archive_name>` to the ledger beside `archive_name`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] when the ledger cannot be opened, locked,
    /// written or synced, and an input error when the entry cannot be encoded.
    pub fn record(&self, archive_name: &Path, sequence: &str) -> LedgerResult<IndexEntry> {
        let entry = IndexEntry::new(sequence, archive_name)?;
        let path = index_path_for(archive_name)?;

        self.serialized(&path, || {
            let mut file = open_locked(&path)?;
            append(&mut file, &path, &entry)
        })?;
        Ok(entry)
    }

    /// Append the entry unless an identical one is already in the ledger.
    ///
    /// The check and the append happen under the same locks, so concurrent
    /// redeliveries of one job produce a single line.
    ///
    /// # Errors
    ///
    /// Same as [`IndexLedger::record`], plus [`LedgerError::Write`] when the
    /// existing ledger cannot be read.
    pub fn ensure_recorded(&self, archive_name: &Path, sequence: &str) -> LedgerResult<Recording> {
        let entry = IndexEntry::new(sequence, archive_name)?;
        let path = index_path_for(archive_name)?;

        let present = self.serialized(&path, || {
            let mut file = open_locked(&path)?;
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)
                .map_err(|source| LedgerError::write("read", &path, source))?;
            if parse_entries(&raw).any(|existing| existing == entry) {
                return Ok(true);
            }
            append(&mut file, &path, &entry)?;
            Ok(false)
        })?;
        if present {
            debug!(ledger = %path.display(), sequence, "ledger entry already present");
            Ok(Recording::AlreadyPresent(entry))
        } else {
            Ok(Recording::Appended(entry))
        }
    }

    /// Whether the ledger beside `archive_name` holds this exact entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] when an existing ledger cannot be read.
    pub fn contains(&self, archive_name: &Path, sequence: &str) -> LedgerResult<bool> {
        let path = index_path_for(archive_name)?;
        Ok(read_entries(&path)?
            .iter()
            .any(|entry| entry.sequence == sequence && entry.archive_name == archive_name))
    }

    /// All complete entries recorded in `directory`, in completion order.
    ///
    /// A directory without a ledger yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] when an existing ledger cannot be read.
    pub fn entries(&self, directory: &Path) -> LedgerResult<Vec<IndexEntry>> {
        read_entries(&directory.join(INDEX_FILE_NAME))
    }

    /// Latest entry recorded in `directory` for `sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] when an existing ledger cannot be read.
    pub fn lookup(&self, directory: &Path, sequence: &str) -> LedgerResult<Option<IndexEntry>> {
        Ok(self
            .entries(directory)?
            .into_iter()
            .rev()
            .find(|entry| entry.sequence == sequence))
    }

    fn serialized<T>(
        &self,
        path: &Path,
        op: impl FnOnce() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let lock = Arc::clone(self.registry().entry(path.to_path_buf()).or_default());
        let result = {
            let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        let mut locks = self.registry();
        // Held only by the registry and this call: nobody else is queued.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        result
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_locked(path: &Path) -> LedgerResult<File> {
    let mut options = OpenOptions::new();
    options.read(true).append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(LEDGER_MODE);
    }
    let file = options
        .open(path)
        .map_err(|source| LedgerError::write("open", path, source))?;
    fs2::FileExt::lock_exclusive(&file).map_err(|source| LedgerError::write("lock", path, source))?;
    Ok(file)
}

fn append(file: &mut File, path: &Path, entry: &IndexEntry) -> LedgerResult<()> {
    let previous_len = file
        .metadata()
        .map_err(|source| LedgerError::write("stat", path, source))?
        .len();
    let line = entry.to_line();

    let written = file
        .write_all(line.as_bytes())
        .map_err(|source| ("write", source))
        .and_then(|()| file.sync_all().map_err(|source| ("sync", source)));
    if let Err((operation, source)) = written {
        if let Err(rollback) = file.set_len(previous_len) {
            warn!(
                ledger = %path.display(),
                error = %rollback,
                "failed to truncate ledger after partial append"
            );
        }
        return Err(LedgerError::write(operation, path, source));
    }

    debug!(
        ledger = %path.display(),
        sequence = %entry.sequence,
        archive = %entry.archive_name.display(),
        "ledger entry appended"
    );
    Ok(())
}

fn read_entries(path: &Path) -> LedgerResult<Vec<IndexEntry>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let read_err = |source| LedgerError::Read {
        path: path.to_path_buf(),
        source,
    };
    fs2::FileExt::lock_shared(&file).map_err(read_err)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw).map_err(read_err)?;
    Ok(parse_entries(&raw).collect())
}

fn parse_entries(raw: &[u8]) -> impl Iterator<Item = IndexEntry> + '_ {
    raw.split_inclusive(|byte| *byte == b'\n')
        .filter_map(|line| line.strip_suffix(b"\n"))
        .filter_map(|line| std::str::from_utf8(line).ok())
        .filter_map(IndexEntry::parse_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn index_path_sits_beside_the_archive() -> LedgerResult<()> {
        let path = index_path_for(Path::new("/archivestore/a/b/c.dat"))?;
        assert_eq!(path, PathBuf::from("/archivestore/a/b/archive.index"));
        assert!(index_path_for(Path::new("c.dat")).is_err());
        Ok(())
    }

    #[test]
    fn record_appends_lines_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        let first = temp.path().join("one.dat");
        let second = temp.path().join("two.dat");

        ledger.record(&first, "1")?;
        ledger.record(&second, "2")?;

        let raw = fs::read_to_string(temp.path().join(INDEX_FILE_NAME))?;
        assert_eq!(
            raw,
            format!("1:{}\n2:{}\n", first.display(), second.display())
        );
        assert!(ledger.contains(&second, "2")?);
        assert!(!ledger.contains(&second, "1")?);
        Ok(())
    }

    #[test]
    fn readers_ignore_a_partial_trailing_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let index = temp.path().join(INDEX_FILE_NAME);
        fs::write(&index, "1:/archivestore/a.dat\n2:/archivestore/b")?;

        let entries = IndexLedger::new().entries(temp.path())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, "1");
        Ok(())
    }

    #[test]
    fn lookup_prefers_the_latest_entry() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        ledger.record(&temp.path().join("old.dat"), "9")?;
        ledger.record(&temp.path().join("new.dat"), "9")?;

        let found = ledger.lookup(temp.path(), "9")?;
        assert_eq!(
            found.map(|entry| entry.archive_name),
            Some(temp.path().join("new.dat"))
        );
        assert_eq!(ledger.lookup(temp.path(), "10")?, None);
        Ok(())
    }

    #[test]
    fn missing_ledger_reads_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(IndexLedger::new().entries(temp.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn ensure_recorded_writes_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        let archived = temp.path().join("x.dat");

        assert!(matches!(
            ledger.ensure_recorded(&archived, "5")?,
            Recording::Appended(_)
        ));
        let again = ledger.ensure_recorded(&archived, "5")?;
        assert!(matches!(again, Recording::AlreadyPresent(_)));
        assert_eq!(again.entry().sequence, "5");
        assert_eq!(ledger.entries(temp.path())?.len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn new_ledgers_are_world_readable() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        IndexLedger::new().record(&temp.path().join("a.dat"), "1")?;
        let mode = fs::metadata(temp.path().join(INDEX_FILE_NAME))?
            .permissions()
            .mode();
        // umask can only clear bits.
        assert_eq!(mode & 0o133, 0);
        assert_eq!(mode & 0o600, 0o600);
        Ok(())
    }

    #[test]
    fn idle_ledgers_release_their_locks() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        for n in 0..200 {
            let dir = temp.path().join(format!("d{n}"));
            fs::create_dir(&dir)?;
            ledger.record(&dir.join("f.dat"), &n.to_string())?;
            ledger.ensure_recorded(&dir.join("f.dat"), &n.to_string())?;
        }
        let _ = ledger.record(Path::new("/nonexistent-archivist-dir/a/b.dat"), "1");
        assert!(ledger.registry().is_empty());
        Ok(())
    }

    #[test]
    fn concurrent_appends_leave_no_registered_locks() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        let archived = temp.path().join("shared.dat");
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let ledger = ledger.clone();
                let archived = &archived;
                scope.spawn(move || {
                    for n in 0..20 {
                        let sequence = format!("{worker}-{n}");
                        assert!(ledger.record(archived, &sequence).is_ok());
                    }
                });
            }
        });
        assert_eq!(ledger.entries(temp.path())?.len(), 160);
        assert!(ledger.registry().is_empty());
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_transient_write_error() {
        let ledger = IndexLedger::new();
        let err = ledger.record(Path::new("/nonexistent-archivist-dir/a/b.dat"), "1");
        assert!(matches!(
            err,
            Err(LedgerError::Write {
                operation: "open",
                ..
            })
        ));
    }
}
