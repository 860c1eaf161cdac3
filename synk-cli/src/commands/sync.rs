//! `synk sync`: one foreground pass, no daemon involved.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use synk_sync::{SyncEngine, SyncResult};

use super::absolute;

/// Arguments for `synk sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// File or folder to copy from.
    pub source: PathBuf,

    /// Folder that receives `<source name>`.
    pub destination: PathBuf,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let source = absolute(&self.source)?;
        let destination = absolute(&self.destination)?;

        let result = SyncEngine::new()
            .try_sync(&source, &destination)
            .with_context(|| format!("sync failed for '{}'", source.display()))?;
        print_result(&source, &destination, &result);
        Ok(())
    }
}

fn print_result(source: &std::path::Path, destination: &std::path::Path, result: &SyncResult) {
    let mark = if result.is_clean() {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!(
        "{mark} {} → {} ({} copied, {} identical, {} errors)",
        source.display(),
        destination.display(),
        result.copied,
        result.skipped,
        result.errored(),
    );
    for err in &result.errors {
        println!("  {}  {err}", "✗".red());
    }
    if result.cancelled {
        println!("  sync was cancelled before finishing");
    }
}
