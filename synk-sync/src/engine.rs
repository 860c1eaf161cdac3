//! The sync pass: one file or a whole tree, copy-if-newer, no deletions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::copy::{copy_if_newer, CopyOutcome};
use crate::error::{io_err, SyncError};
use crate::result::SyncResult;

/// Executes sync passes. Cheap to clone; holds no per-pass state.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    cancel: Option<Arc<AtomicBool>>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop passes at the next file boundary once `flag` is raised.
    pub fn with_cancel(flag: Arc<AtomicBool>) -> Self {
        Self { cancel: Some(flag) }
    }

    /// Mirror `source` into `destination/<source name>`.
    ///
    /// Batch-level failures are logged and yield an empty result.
    pub fn sync(&self, source: &Path, destination: &Path) -> SyncResult {
        tracing::info!("Starting sync: {} -> {}", source.display(), destination.display());
        match self.try_sync(source, destination) {
            Ok(result) => {
                log_summary(&result);
                result
            }
            Err(err) => {
                tracing::error!("Sync failed: {err}");
                SyncResult::default()
            }
        }
    }

    /// Like [`SyncEngine::sync`] but reports batch-level failures.
    pub fn try_sync(&self, source: &Path, destination: &Path) -> Result<SyncResult, SyncError> {
        let meta = fs::metadata(source).map_err(|e| SyncError::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        })?;
        let name = source.file_name().ok_or_else(|| SyncError::UnnamedSource {
            path: source.to_path_buf(),
        })?;
        let target = destination.join(name);

        let mut result = SyncResult::default();
        if meta.is_dir() {
            self.sync_directory(source, &target, &mut result)?;
        } else {
            let relative = PathBuf::from(name);
            apply(source, &target, relative, &mut result);
        }
        Ok(result)
    }

    fn sync_directory(
        &self,
        source: &Path,
        target: &Path,
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        fs::create_dir_all(target).map_err(|e| io_err(target, e))?;

        for entry in WalkDir::new(source).follow_links(true).min_depth(1) {
            if self.is_cancelled() {
                tracing::warn!("Sync cancelled: {}", source.display());
                result.cancelled = true;
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let relative = err
                        .path()
                        .and_then(|p| p.strip_prefix(source).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    let io = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    result.record_error(relative, &io);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let relative = relative.to_path_buf();
            apply(entry.path(), &target.join(&relative), relative, result);
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

fn apply(source: &Path, dest: &Path, relative: PathBuf, result: &mut SyncResult) {
    tally(result, relative, copy_if_newer(source, dest));
}

fn tally(result: &mut SyncResult, relative: PathBuf, outcome: io::Result<CopyOutcome>) {
    match outcome {
        Ok(CopyOutcome::Copied) => result.copied += 1,
        Ok(CopyOutcome::UpToDate) => result.skipped += 1,
        Err(err) => result.record_error(relative, &err),
    }
}

fn log_summary(result: &SyncResult) {
    tracing::info!(
        "Sync completed - Copied: {}, Identical: {}, Errors: {}",
        result.copied,
        result.skipped,
        result.errored()
    );
    if !result.errors.is_empty() {
        tracing::warn!("Files with errors:");
        for error in &result.errors {
            tracing::warn!("  - {error}");
        }
    }
}
