//! synk: copy-if-newer folder sync with a scheduling daemon.
//!
//! # Usage
//!
//! ```text
//! synk [--data-dir DIR] sync <source> <destination>
//! synk run <source> <destination> [--save]
//! synk schedule <source> <destination> --at <datetime> [--repeat] [--save]
//! synk run-saved <id>
//! synk list [--json]
//! synk remove <id>
//! synk daemon start|stop|status|logs
//! ```

mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    run::{RunArgs, RunSavedArgs},
    schedule::ScheduleArgs,
    sync::SyncArgs,
    tasks::{ListArgs, RemoveArgs},
};
use synk_core::types::local_now;
use synk_daemon::paths::resolve_data_dir;
use synk_daemon::scheduler::next_fire;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "synk",
    version,
    about = "Copy newer files between folders, now or on a schedule",
    long_about = None,
)]
struct Cli {
    /// Directory holding the task file, socket and logs
    /// (default: $SYNK_HOME, else the executable's directory).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync in the foreground without the daemon.
    Sync(SyncArgs),

    /// Ask the daemon to sync right away.
    Run(RunArgs),

    /// Schedule a one-time or daily sync.
    Schedule(ScheduleArgs),

    /// Run a saved task or template by id.
    RunSaved(RunSavedArgs),

    /// List saved and scheduled tasks.
    List(ListArgs),

    /// Delete a saved or scheduled task.
    Remove(RemoveArgs),

    /// Manage the scheduling daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Date-time argument
// ---------------------------------------------------------------------------

/// `--at` value: `YYYY-MM-DD HH:MM[:SS]` (space or `T`), or a bare `HH:MM`
/// meaning its next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeArg(pub NaiveDateTime);

const DATETIME_INPUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl DateTimeArg {
    fn parse_at(s: &str, now: NaiveDateTime) -> std::result::Result<Self, String> {
        let s = s.trim();
        if let Some(dt) = DATETIME_INPUTS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        {
            return Ok(Self(dt));
        }
        ["%H:%M", "%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
            .map(|time| Self(next_fire(time, now)))
            .ok_or_else(|| {
                format!("invalid date-time '{s}'; expected 'YYYY-MM-DD HH:MM[:SS]' or 'HH:MM'")
            })
    }
}

impl FromStr for DateTimeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_at(s, local_now())
    }
}

impl fmt::Display for DateTimeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.format("%Y-%m-%d %H:%M:%S").fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir).context("could not determine data directory")?;

    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Run(args) => args.run(&data_dir),
        Commands::Schedule(args) => args.run(&data_dir),
        Commands::RunSaved(args) => args.run(&data_dir),
        Commands::List(args) => args.run(&data_dir),
        Commands::Remove(args) => args.run(&data_dir),
        Commands::Daemon { command } => commands::daemon::run(command, &data_dir),
    }
}
