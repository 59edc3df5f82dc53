//! Ledger line encoding.

use std::path::{Path, PathBuf};

use crate::error::{LedgerError, LedgerResult};

/// Separator between the sequence token and the archive path.
pub(crate) const SEPARATOR: char = ':';

/// One `(sequence, archive_name)` record in an archive index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Sequence token carried by the job.
    pub sequence: String,
    /// Absolute path of the archived file.
    pub archive_name: PathBuf,
}

impl IndexEntry {
    /// Build an entry, rejecting tokens that would corrupt the line format.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSequence`] for an empty token or one
    /// containing the separator or a newline, and [`LedgerError::NonUtf8Path`]
    /// when the path cannot be written as UTF-8.
    pub fn new(sequence: &str, archive_name: &Path) -> LedgerResult<Self> {
        if sequence.is_empty() {
            return Err(LedgerError::InvalidSequence {
                reason: "empty",
                value: String::new(),
            });
        }
        if sequence.contains(SEPARATOR) || sequence.contains('\n') {
            return Err(LedgerError::InvalidSequence {
                reason: "contains_separator",
                value: sequence.to_string(),
            });
        }
        match archive_name.to_str() {
            Some(text) if !text.contains('\n') => Ok(Self {
                sequence: sequence.to_string(),
                archive_name: archive_name.to_path_buf(),
            }),
            _ => Err(LedgerError::NonUtf8Path {
                path: archive_name.to_path_buf(),
            }),
        }
    }

    /// Render the entry as a newline-terminated ledger line.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{}{SEPARATOR}{}\n",
            self.sequence,
            self.archive_name.display()
        )
    }

    /// Parse a single line (without its trailing newline).
    ///
    /// The sequence never contains the separator, so the first `:` splits the
    /// line even when the path contains more.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let (sequence, path) = line.split_once(SEPARATOR)?;
        if sequence.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self {
            sequence: sequence.to_string(),
            archive_name: PathBuf::from(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_uses_first_separator_only() {
        let entry = IndexEntry::parse_line("42:/archive/a:b.dat");
        assert_eq!(
            entry,
            Some(IndexEntry {
                sequence: "42".into(),
                archive_name: PathBuf::from("/archive/a:b.dat"),
            })
        );
    }

    #[test]
    fn to_line_is_newline_terminated() -> LedgerResult<()> {
        let entry = IndexEntry::new("7", Path::new("/archivestore/x/y.dat"))?;
        assert_eq!(entry.to_line(), "7:/archivestore/x/y.dat\n");
        Ok(())
    }

    #[test]
    fn rejects_tokens_that_break_the_format() {
        assert!(IndexEntry::new("", Path::new("/a")).is_err());
        assert!(IndexEntry::new("a:b", Path::new("/a")).is_err());
        assert!(IndexEntry::new("a\nb", Path::new("/a")).is_err());
        assert!(IndexEntry::parse_line("no-separator").is_none());
        assert!(IndexEntry::parse_line(":/path").is_none());
    }
}
