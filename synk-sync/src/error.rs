//! Error types for synk-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Batch-level failures: the pass could not even start.
///
/// Per-file failures never surface here; they are recorded in
/// [`crate::SyncResult::errors`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source path does not exist or cannot be inspected.
    #[error("source unavailable at {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source path has no final component to name the mirrored entry.
    #[error("source path has no file name: {path}")]
    UnnamedSource { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
