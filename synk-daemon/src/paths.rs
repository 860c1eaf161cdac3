use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DaemonError;

pub use synk_core::TASKS_FILE;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SYNK_HOME";

pub const DAEMON_SOCKET: &str = "synk.sock";
pub const SERVICE_LOG: &str = "sync_service.log";

/// Longest single sleep while waiting for a fire instant; the wall clock is
/// re-read after each nap.
pub const MAX_NAP: Duration = Duration::from_secs(60);

/// How long in-flight copies get to reach a file boundary at shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Data directory: explicit flag, then `$SYNK_HOME`, then the directory
/// holding the running executable.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, DaemonError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().map_err(|e| DaemonError::DataDir(e.to_string()))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| DaemonError::DataDir(format!("{} has no parent", exe.display())))
}

pub fn tasks_path(data_dir: &Path) -> PathBuf {
    data_dir.join(TASKS_FILE)
}

pub fn socket_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DAEMON_SOCKET)
}

pub fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

pub fn service_log_path(data_dir: &Path) -> PathBuf {
    logs_dir(data_dir).join(SERVICE_LOG)
}
