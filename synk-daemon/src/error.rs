use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

use synk_core::{StoreError, TaskId};

/// Error surface for the scheduler, task manager and socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("Please select a future time (got {when})")]
    PastSchedule { when: NaiveDateTime },

    #[error("no saved task with id {id}")]
    TaskNotFound { id: TaskId },

    #[error("task {id} has an unusable schedule: {source}")]
    InvalidSchedule {
        id: TaskId,
        #[source]
        source: StoreError,
    },

    #[error("cannot determine data directory: {0}")]
    DataDir(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(what: &str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::Protocol(format!("{what} join error: {err}"))
}
