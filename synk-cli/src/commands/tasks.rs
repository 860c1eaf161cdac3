//! `synk list` and `synk remove`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use synk_core::{Task, TaskId, TaskStore};
use synk_daemon::{request_remove, DaemonError};

/// Arguments for `synk list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "kind")]
    kind: &'static str,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "destination")]
    destination: String,
    #[tabled(rename = "scheduled")]
    scheduled: String,
    #[tabled(rename = "last ran")]
    last_ran: String,
}

impl ListArgs {
    /// Reads the task file directly so it works without the daemon.
    pub fn run(self, data_dir: &Path) -> Result<()> {
        let store = TaskStore::in_dir(data_dir);
        let tasks = store
            .try_read()
            .with_context(|| format!("failed to read {}", store.path().display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tasks).context("failed to serialize tasks")?
            );
            return Ok(());
        }

        if tasks.is_empty() {
            println!("No saved or scheduled tasks.");
            return Ok(());
        }

        let rows: Vec<TaskRow> = tasks.iter().map(task_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn task_row(task: &Task) -> TaskRow {
    let scheduled = match task.scheduled() {
        Ok(at) if task.is_repeat => format!("daily {}", at.format("%H:%M")),
        Ok(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => format!("invalid ({})", task.scheduled_datetime),
    };
    TaskRow {
        id: task.id.to_string(),
        kind: task_kind(task),
        source: task.source_path.display().to_string(),
        destination: task.destination_path.display().to_string(),
        scheduled: if task.is_template {
            "-".to_string()
        } else {
            scheduled
        },
        last_ran: task
            .last_ran
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string()),
    }
}

fn task_kind(task: &Task) -> &'static str {
    if task.is_template {
        "template"
    } else if task.is_repeat {
        "daily"
    } else {
        "once"
    }
}

/// Arguments for `synk remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub id: String,
}

impl RemoveArgs {
    /// Goes through the daemon so a pending run is cancelled too; edits the
    /// task file directly when the daemon is not running.
    pub fn run(self, data_dir: &Path) -> Result<()> {
        let id = TaskId::from(self.id);
        let removed = match request_remove(data_dir, &id) {
            Ok(removed) => removed,
            Err(DaemonError::DaemonNotRunning { .. }) => TaskStore::in_dir(data_dir).remove(&id),
            Err(err) => return Err(err).context("failed to remove task"),
        };

        if !removed {
            bail!("no task with id {id}");
        }
        println!("{} removed task {id}", "✓".green());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn rows_describe_each_kind() {
        let once = task_row(&Task::one_time("/s".into(), "/d".into(), at(9, 5)));
        assert_eq!(once.kind, "once");
        assert_eq!(once.scheduled, "2025-03-04 09:05");
        assert_eq!(once.last_ran, "never");

        let daily = task_row(&Task::repeating("/s".into(), "/d".into(), at(22, 0)));
        assert_eq!(daily.kind, "daily");
        assert_eq!(daily.scheduled, "daily 22:00");

        let template = task_row(&Task::template("/s".into(), "/d".into(), at(1, 0)));
        assert_eq!(template.kind, "template");
        assert_eq!(template.scheduled, "-");
    }

    #[test]
    fn unparsable_schedule_is_shown_not_hidden() {
        let mut task = Task::one_time("/s".into(), "/d".into(), at(9, 5));
        task.scheduled_datetime = synk_core::StoredDateTime("soon".into());
        assert_eq!(task_row(&task).scheduled, "invalid (soon)");
    }
}
