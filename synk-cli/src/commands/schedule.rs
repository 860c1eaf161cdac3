//! `synk schedule`: one-time or daily syncs run by the daemon.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use synk_core::types::local_now;
use synk_daemon::request_schedule;

use super::absolute;
use super::run::not_running_hint;
use crate::DateTimeArg;

/// Arguments for `synk schedule`.
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    pub source: PathBuf,
    pub destination: PathBuf,

    /// When to run: `YYYY-MM-DD HH:MM[:SS]` or `HH:MM` (next occurrence).
    #[arg(long)]
    pub at: DateTimeArg,

    /// Run every day at the same time of day.
    #[arg(long)]
    pub repeat: bool,

    /// Keep the task in the saved list.
    #[arg(long)]
    pub save: bool,
}

impl ScheduleArgs {
    pub fn run(self, data_dir: &Path) -> Result<()> {
        let when = self.at.0;
        if when <= local_now() {
            bail!("Please select a future time (got {})", self.at);
        }
        let source = absolute(&self.source)?;
        let destination = absolute(&self.destination)?;

        let task = request_schedule(data_dir, &source, &destination, when, self.repeat, self.save)
            .map_err(not_running_hint)
            .context("failed to schedule sync")?;

        if task.is_repeat {
            println!(
                "{} daily sync scheduled for {}",
                "✓".green(),
                when.format("%H:%M")
            );
        } else {
            println!(
                "{} sync scheduled for {}",
                "✓".green(),
                when.format("%m/%d %H:%M")
            );
        }
        println!("  id {}", task.id);
        Ok(())
    }
}
