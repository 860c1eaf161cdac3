//! `synk run` and `synk run-saved`: immediate syncs through the daemon.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;

use synk_core::TaskId;
use synk_daemon::{request_run, request_run_saved, DaemonError};

use super::{absolute, NOT_RUNNING_HINT};

/// Arguments for `synk run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    pub source: PathBuf,
    pub destination: PathBuf,

    /// Also store the pair as a reusable template.
    #[arg(long)]
    pub save: bool,
}

impl RunArgs {
    pub fn run(self, data_dir: &Path) -> Result<()> {
        let source = absolute(&self.source)?;
        let destination = absolute(&self.destination)?;

        let data = request_run(data_dir, &source, &destination, self.save)
            .map_err(not_running_hint)
            .context("failed to start sync")?;

        println!(
            "{} sync started: {} → {}",
            "✓".green(),
            source.display(),
            destination.display()
        );
        if let Some(id) = data
            .get("template")
            .and_then(|t| t.get("id"))
            .and_then(|id| id.as_str())
        {
            println!("  saved as template {id}");
        }
        Ok(())
    }
}

/// Arguments for `synk run-saved`.
#[derive(Args, Debug)]
pub struct RunSavedArgs {
    /// Task or template id (see `synk list`).
    pub id: String,
}

impl RunSavedArgs {
    pub fn run(self, data_dir: &Path) -> Result<()> {
        let id = TaskId::from(self.id);
        let data = request_run_saved(data_dir, &id)
            .map_err(not_running_hint)
            .with_context(|| format!("failed to run task {id}"))?;

        match data.get("outcome").and_then(|o| o.as_str()) {
            Some("already_active") => println!("task {id} is already scheduled"),
            Some("dispatched") => println!("{} task {id} scheduled", "✓".green()),
            _ => println!("{} task {id} running", "✓".green()),
        }
        Ok(())
    }
}

/// Swap the bare "not running" error for one that says what to do.
pub fn not_running_hint(err: DaemonError) -> anyhow::Error {
    match err {
        DaemonError::DaemonNotRunning { .. } => anyhow!(NOT_RUNNING_HINT),
        other => anyhow::Error::new(other),
    }
}
