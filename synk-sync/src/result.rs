//! Per-invocation sync outcome.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

/// Why a single entry could not be mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FileErrorKind {
    AccessDenied,
    Other(String),
}

impl FileErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            FileErrorKind::AccessDenied
        } else {
            FileErrorKind::Other(err.to_string())
        }
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileErrorKind::AccessDenied => write!(f, "Access denied"),
            FileErrorKind::Other(description) => write!(f, "{description}"),
        }
    }
}

/// A failed entry, keyed by its path relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub relative_path: PathBuf,
    pub kind: FileErrorKind,
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.relative_path.display(), self.kind)
    }
}

/// Counts for one `sync` call. Never shared between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub copied: usize,
    /// Files already up to date at the destination.
    pub skipped: usize,
    pub errors: Vec<FileError>,
    /// The pass stopped early because the engine's cancel flag was raised.
    pub cancelled: bool,
}

impl SyncResult {
    pub fn errored(&self) -> usize {
        self.errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    pub(crate) fn record_error(&mut self, relative_path: PathBuf, err: &io::Error) {
        self.errors.push(FileError {
            relative_path,
            kind: FileErrorKind::from_io(err),
        });
    }
}
