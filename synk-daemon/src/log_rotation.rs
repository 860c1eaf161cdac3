//! Size-based rotation of the service log.
//!
//! Runs once at daemon start, before the log file is opened for append:
//!   sync_service.log → sync_service.log.1 → … → sync_service.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::service_log_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the live file reaches this size.
    pub max_bytes: u64,
    /// Rotated copies kept; older ones are deleted.
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

/// Rotate `log_path` if it has reached `policy.max_bytes`.
///
/// Returns `true` if the file was shifted to `.1`. A missing file is not an
/// error. The live file is not recreated; the next writer creates it.
pub fn rotate_log(log_path: &Path, policy: RotationPolicy) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < policy.max_bytes || policy.keep == 0 {
        return Ok(false);
    }

    let oldest = numbered(log_path, policy.keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..policy.keep).rev() {
        let from = numbered(log_path, n);
        if from.exists() {
            fs::rename(&from, numbered(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered(log_path, 1))?;
    Ok(true)
}

/// Rotate `<data_dir>/logs/sync_service.log` with the default policy.
///
/// Failures are returned so the caller can report them once tracing is up.
pub fn rotate_service_log(data_dir: &Path) -> io::Result<bool> {
    rotate_log(&service_log_path(data_dir), RotationPolicy::default())
}

fn numbered(base: &Path, n: usize) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 16,
        keep: 3,
    };

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync_service.log");
        fs::write(&log, "short").unwrap();
        assert!(!rotate_log(&log, SMALL).unwrap());
        assert!(log.exists());
        assert!(!numbered(&log, 1).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!rotate_log(&dir.path().join("absent.log"), SMALL).unwrap());
    }

    #[test]
    fn oversized_file_moves_to_first_slot() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync_service.log");
        fs::write(&log, "x".repeat(32)).unwrap();

        assert!(rotate_log(&log, SMALL).unwrap());
        assert!(!log.exists());
        assert_eq!(fs::read_to_string(numbered(&log, 1)).unwrap().len(), 32);
    }

    #[test]
    fn repeated_rotation_keeps_bounded_history() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync_service.log");

        for round in 0..5u8 {
            fs::write(&log, vec![b'a' + round; 20]).unwrap();
            rotate_log(&log, SMALL).unwrap();
        }

        // Newest in .1, nothing past the keep limit.
        assert_eq!(fs::read(numbered(&log, 1)).unwrap()[0], b'e');
        assert_eq!(fs::read(numbered(&log, 3)).unwrap()[0], b'c');
        assert!(!numbered(&log, 4).exists());
    }

    #[test]
    fn default_policy_matches_service_limits() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.keep, 5);
    }
}
