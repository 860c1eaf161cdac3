pub mod daemon;
pub mod run;
pub mod schedule;
pub mod sync;
pub mod tasks;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolve `path` against the current directory; the daemon may run with a
/// different working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    Ok(cwd.join(path))
}

pub const NOT_RUNNING_HINT: &str = "daemon is not running; start it with `synk daemon start`";
