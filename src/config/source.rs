//! Resolved configuration inputs.

use std::fmt;
use std::path::{Path, PathBuf};

/// Display form of the standard-input sentinel.
pub const STDIN_SENTINEL: &str = "stdin:";

/// A single configuration input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEntry {
    /// A file on disk.
    Path(PathBuf),
    /// Read the configuration from standard input.
    Stdin,
}

impl SourceEntry {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SourceEntry::Path(path) => Some(path),
            SourceEntry::Stdin => None,
        }
    }
}

impl fmt::Display for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEntry::Path(path) => write!(f, "{}", path.display()),
            SourceEntry::Stdin => f.write_str(STDIN_SENTINEL),
        }
    }
}

/// Ordered, non-empty list of configuration inputs.
///
/// Later entries override earlier ones when merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    entries: Vec<SourceEntry>,
}

impl ConfigSource {
    /// Build a source from entries. Returns `None` when `entries` is empty.
    pub fn new(entries: Vec<SourceEntry>) -> Option<Self> {
        if entries.is_empty() {
            None
        } else {
            Some(Self { entries })
        }
    }

    /// A source that reads standard input only.
    pub fn stdin() -> Self {
        Self {
            entries: vec![SourceEntry::Stdin],
        }
    }

    /// A source made of a single file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: vec![SourceEntry::Path(path.into())],
        }
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn is_stdin_only(&self) -> bool {
        self.entries.iter().all(|e| matches!(e, SourceEntry::Stdin))
    }

    /// Absolute paths of every file entry; the stdin sentinel is skipped.
    pub fn watch_set(&self) -> WatchSet {
        let mut paths = Vec::new();
        for path in self.entries.iter().filter_map(SourceEntry::as_path) {
            match std::path::absolute(path) {
                Ok(abs) => paths.push(abs),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to resolve absolute path");
                }
            }
        }
        WatchSet { paths }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Absolute file paths watched for changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    paths: Vec<PathBuf>,
}

impl WatchSet {
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_rejected() {
        assert!(ConfigSource::new(Vec::new()).is_none());
    }

    #[test]
    fn test_watch_set_skips_stdin_and_is_absolute() {
        let source = ConfigSource::new(vec![
            SourceEntry::Path("relative.json".into()),
            SourceEntry::Stdin,
        ])
        .unwrap();

        let set = source.watch_set();
        assert_eq!(set.len(), 1);
        let path = set.iter().next().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("relative.json"));
    }

    #[test]
    fn test_display_lists_entries_in_order() {
        let source = ConfigSource::new(vec![
            SourceEntry::Path("a.json".into()),
            SourceEntry::Stdin,
        ])
        .unwrap();
        assert_eq!(source.to_string(), "a.json, stdin:");
        assert!(ConfigSource::stdin().is_stdin_only());
    }
}
