//! Copy-if-newer for a single file.
//!
//! ## `copy_if_newer` protocol
//!
//! 1. Stat the source.
//! 2. Stat the destination; absent means "copy".
//! 3. Skip unless the source mtime is strictly greater.
//! 4. Create the destination's parent directories.
//! 5. Copy content and permission bits to `<dest>.synk.tmp`.
//! 6. Stamp the source's access/modification times onto the tmp file.
//! 7. Rename over the destination (atomic on POSIX).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// Outcome of mirroring one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Destination was absent or older and has been replaced.
    Copied,
    /// Destination mtime is at least the source's.
    UpToDate,
}

/// Mirror `source` onto `dest` when `dest` is absent or strictly older.
///
/// Errors are returned raw so the caller can classify them per file.
pub fn copy_if_newer(source: &Path, dest: &Path) -> io::Result<CopyOutcome> {
    let src_meta = fs::metadata(source)?;
    if !needs_copy(&src_meta, dest)? {
        tracing::debug!("up to date: {}", dest.display());
        return Ok(CopyOutcome::UpToDate);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(dest);
    if let Err(e) = copy_preserving_times(source, &tmp, &src_meta) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    tracing::debug!("copied: {} -> {}", source.display(), dest.display());
    Ok(CopyOutcome::Copied)
}

fn needs_copy(src_meta: &fs::Metadata, dest: &Path) -> io::Result<bool> {
    let dest_meta = match fs::metadata(dest) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err),
    };
    Ok(src_meta.modified()? > dest_meta.modified()?)
}

fn copy_preserving_times(source: &Path, tmp: &Path, src_meta: &fs::Metadata) -> io::Result<()> {
    // `fs::copy` carries the permission bits along with the content.
    fs::copy(source, tmp)?;
    let atime = FileTime::from_last_access_time(src_meta);
    let mtime = FileTime::from_last_modification_time(src_meta);
    filetime::set_file_times(tmp, atime, mtime)
}

fn tmp_path(dest: &Path) -> PathBuf {
    PathBuf::from(format!("{}.synk.tmp", dest.display()))
}
