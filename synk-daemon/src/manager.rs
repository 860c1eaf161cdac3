//! The task manager: one service object owning the store, the sync engine
//! and the active set. Built once at startup and shared as
//! `Arc<TaskManager>` with the socket server and startup recovery.
//!
//! Execution model: one tokio task per active sync task. A unit waits on the
//! wall clock, runs the copy on the blocking pool, then writes its outcome
//! back through the store. Units are supervised so an error or panic ends
//! only that unit. A unit that finds the task file unreadable keeps running
//! from its own copy of the task.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::task::JoinHandle;

use synk_core::types::local_now;
use synk_core::{Task, TaskId, TaskStore, TaskUpdate};
use synk_sync::{SyncEngine, SyncResult};

use crate::active::{ActiveGuard, ActiveSet};
use crate::error::{join_err, DaemonError};
use crate::scheduler::{next_fire, plan_recovery, sleep_until, wait_duration, RecoveryAction};

/// Parameters for [`TaskManager::schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub when: NaiveDateTime,
    pub repeat: bool,
    /// Scheduled tasks are persisted either way so a restart can recover
    /// them; the flag is kept for callers that mirror the run-now dialog.
    pub save: bool,
}

/// An immediate, unscheduled sync in flight.
#[derive(Debug)]
pub struct SyncRun {
    pub handle: JoinHandle<SyncResult>,
    /// Template saved alongside the run, if requested.
    pub template: Option<Task>,
}

/// Scheduled runs kept for `status`.
const RUN_HISTORY: usize = 50;

/// One finished scheduled run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: TaskId,
    pub ran_at: NaiveDateTime,
    /// `last_ran` reached the task file.
    pub recorded: bool,
    pub result: SyncResult,
}

/// What [`TaskManager::run_saved`] started.
#[derive(Debug)]
pub enum SavedRun {
    /// A template's paths are being synced right now.
    Immediate(JoinHandle<SyncResult>),
    /// A scheduled task got an execution unit.
    Dispatched(JoinHandle<()>),
    /// The task already has an execution unit; nothing started.
    AlreadyActive,
}

#[derive(Debug)]
pub struct TaskManager {
    store: Arc<TaskStore>,
    engine: SyncEngine,
    active: Arc<ActiveSet>,
    cancel: Arc<AtomicBool>,
    runs: Mutex<VecDeque<RunRecord>>,
}

impl TaskManager {
    pub fn new(store: TaskStore) -> Arc<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        Arc::new(Self {
            store: Arc::new(store),
            engine: SyncEngine::with_cancel(Arc::clone(&cancel)),
            active: ActiveSet::new(),
            cancel,
            runs: Mutex::new(VecDeque::with_capacity(RUN_HISTORY)),
        })
    }

    /// Manager over `<data_dir>/sync_tasks.json`.
    pub fn open(data_dir: &Path) -> Arc<Self> {
        Self::new(TaskStore::in_dir(data_dir))
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn active_ids(&self) -> Vec<TaskId> {
        self.active.ids()
    }

    pub fn is_active(&self, id: &TaskId) -> bool {
        self.active.contains(id)
    }

    /// Most recent scheduled runs, oldest first.
    pub fn recent_runs(&self) -> Vec<RunRecord> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Stop in-flight copies at their next file boundary.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Startup recovery
    // -----------------------------------------------------------------------

    /// Reconcile persisted tasks with the clock and dispatch the survivors.
    ///
    /// Store updates and removals are complete when this returns; the
    /// returned handles belong to the dispatched units.
    pub async fn recover(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, DaemonError> {
        let tasks = self.with_store(|store| store.load()).await?;
        let mut handles = Vec::new();

        for action in plan_recovery(tasks, local_now()) {
            let task = match action {
                RecoveryAction::Reschedule { mut task, next_fire } => {
                    let id = task.id.clone();
                    self.with_store(move |store| {
                        store.update(
                            &id,
                            TaskUpdate {
                                scheduled_datetime: Some(next_fire),
                                ..TaskUpdate::default()
                            },
                        )
                    })
                    .await?;
                    task.scheduled_datetime = next_fire.into();
                    tracing::info!(
                        task = %task.id,
                        source = %task.source_path.display(),
                        next = %next_fire.format("%Y-%m-%d %H:%M"),
                        "scheduling repeat task",
                    );
                    task
                }
                RecoveryAction::Missed(task) => {
                    tracing::info!(
                        task = %task.id,
                        source = %task.source_path.display(),
                        "removing missed one-time task",
                    );
                    self.remove(&task.id).await?;
                    continue;
                }
                RecoveryAction::Dispatch(task) => {
                    tracing::info!(
                        task = %task.id,
                        source = %task.source_path.display(),
                        at = %task.scheduled_datetime,
                        "scheduling task",
                    );
                    task
                }
            };
            if let Some(handle) = self.dispatch(task) {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Start an execution unit for `task` unless its id is already active.
    ///
    /// Templates are never dispatched.
    pub fn dispatch(self: &Arc<Self>, task: Task) -> Option<JoinHandle<()>> {
        if task.is_template {
            tracing::debug!(task = %task.id, "not dispatching template");
            return None;
        }
        let Some(guard) = self.active.try_activate(&task.id) else {
            tracing::debug!(task = %task.id, "task already active, dispatch ignored");
            return None;
        };

        let manager = Arc::clone(self);
        let id = task.id.clone();
        Some(tokio::spawn(async move {
            let unit = tokio::spawn(manager.execute(task, guard));
            match unit.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(task = %id, error = %err, "task execution failed"),
                Err(err) => tracing::error!(task = %id, error = %err, "task execution aborted"),
            }
        }))
    }

    async fn execute(self: Arc<Self>, task: Task, _guard: ActiveGuard) -> Result<(), DaemonError> {
        if task.is_repeat {
            self.run_repeating(task).await
        } else {
            self.run_one_time(task).await
        }
    }

    async fn run_one_time(&self, task: Task) -> Result<(), DaemonError> {
        let when = scheduled_instant(&task)?;
        let now = local_now();
        if when > now {
            tracing::info!(
                task = %task.id,
                wait_secs = wait_duration(when, now).as_secs(),
                "waiting for scheduled sync",
            );
            sleep_until(when).await;
        }

        let Some(current) = self.current(&task).await? else {
            tracing::info!(task = %task.id, "task removed before it was due");
            return Ok(());
        };

        tracing::info!(
            task = %current.id,
            source = %current.source_path.display(),
            "running scheduled sync",
        );
        let result = self.sync_task(&current).await?;

        let ran_at = local_now();
        let id = current.id.clone();
        let outcome = self
            .with_store(move |store| {
                let stamped = store.try_update(
                    &id,
                    TaskUpdate {
                        last_ran: Some(ran_at),
                        ..TaskUpdate::default()
                    },
                )?;
                store.try_remove(&id)?;
                Ok::<_, synk_core::StoreError>(stamped.is_some())
            })
            .await?;
        let recorded = match outcome {
            Ok(recorded) => recorded,
            Err(err) => {
                tracing::error!(task = %current.id, error = %err, "could not retire one-time task");
                false
            }
        };
        self.record_run(current.id, ran_at, recorded, result);
        Ok(())
    }

    async fn run_repeating(&self, task: Task) -> Result<(), DaemonError> {
        let time_of_day = scheduled_instant(&task)?.time();
        let id = task.id.clone();
        let mut last_fire: Option<NaiveDateTime> = None;

        loop {
            let now = local_now();
            let from = last_fire.map_or(now, |fired| fired.max(now));
            let fire = next_fire(time_of_day, from);
            tracing::info!(
                task = %id,
                wait_secs = wait_duration(fire, now).as_secs(),
                next = %fire.format("%Y-%m-%d %H:%M"),
                "next sync scheduled",
            );
            sleep_until(fire).await;

            let Some(current) = self.current(&task).await? else {
                tracing::info!(task = %id, "repeat task removed, stopping");
                return Ok(());
            };

            tracing::info!(
                task = %id,
                source = %current.source_path.display(),
                "running repeat sync",
            );
            let result = self.sync_task(&current).await?;

            let ran_at = local_now();
            let update = TaskUpdate {
                last_ran: Some(ran_at),
                scheduled_datetime: Some(fire + chrono::Duration::days(1)),
            };
            let update_id = id.clone();
            let stored = self
                .with_store(move |store| store.try_update(&update_id, update))
                .await?;
            let recorded = match stored {
                Ok(Some(_)) => true,
                Ok(None) => {
                    tracing::info!(task = %id, "repeat task removed during run, stopping");
                    self.record_run(id, ran_at, false, result);
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(task = %id, error = %err, "could not record repeat run");
                    false
                }
            };
            self.record_run(id.clone(), ran_at, recorded, result);
            last_fire = Some(fire);
        }
    }

    // -----------------------------------------------------------------------
    // Collaborator-facing operations
    // -----------------------------------------------------------------------

    /// Sync `source` into `destination` right away, outside the scheduler.
    ///
    /// With `save_as_template` the pair is also stored as a template.
    pub async fn run_now(
        self: &Arc<Self>,
        source: PathBuf,
        destination: PathBuf,
        save_as_template: bool,
    ) -> Result<SyncRun, DaemonError> {
        tracing::info!(source = %source.display(), "sync started");
        let handle = self.spawn_sync(source.clone(), destination.clone());

        let template = if save_as_template {
            let template = Task::template(source, destination, local_now());
            let stored = template.clone();
            self.with_store(move |store| store.add(stored)).await?;
            tracing::info!(task = %template.id, "task template saved");
            Some(template)
        } else {
            None
        };
        Ok(SyncRun { handle, template })
    }

    /// Persist and dispatch a one-time or daily task.
    ///
    /// Rejects instants at or before the current time.
    pub async fn schedule(self: &Arc<Self>, request: ScheduleRequest) -> Result<Task, DaemonError> {
        if request.when <= local_now() {
            return Err(DaemonError::PastSchedule { when: request.when });
        }

        let task = if request.repeat {
            Task::repeating(request.source, request.destination, request.when)
        } else {
            Task::one_time(request.source, request.destination, request.when)
        };
        let stored = task.clone();
        self.with_store(move |store| store.add(stored)).await?;

        if request.repeat {
            tracing::info!(
                task = %task.id,
                saved = request.save,
                "daily sync scheduled for {}",
                request.when.format("%H:%M"),
            );
        } else {
            tracing::info!(
                task = %task.id,
                saved = request.save,
                "sync scheduled for {}",
                request.when.format("%m/%d %H:%M"),
            );
        }

        self.dispatch(task.clone());
        Ok(task)
    }

    /// Run a stored record now: templates sync their paths immediately,
    /// scheduled tasks go through the dispatch guard.
    pub async fn run_saved(self: &Arc<Self>, id: &TaskId) -> Result<SavedRun, DaemonError> {
        let lookup = id.clone();
        let task = self
            .with_store(move |store| store.try_get(&lookup))
            .await??
            .ok_or_else(|| DaemonError::TaskNotFound { id: id.clone() })?;

        if task.is_template {
            tracing::info!(task = %task.id, "running saved template");
            return Ok(SavedRun::Immediate(
                self.spawn_sync(task.source_path, task.destination_path),
            ));
        }
        Ok(match self.dispatch(task) {
            Some(handle) => SavedRun::Dispatched(handle),
            None => SavedRun::AlreadyActive,
        })
    }

    pub async fn list(&self) -> Result<Vec<Task>, DaemonError> {
        self.with_store(|store| store.load()).await
    }

    /// Delete the record and forget its active id. An in-flight run is not
    /// interrupted, but no later occurrence will start.
    pub async fn remove(&self, id: &TaskId) -> Result<bool, DaemonError> {
        let owned = id.clone();
        let removed = self.with_store(move |store| store.remove(&owned)).await?;
        self.active.discard(id);
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn spawn_sync(&self, source: PathBuf, destination: PathBuf) -> JoinHandle<SyncResult> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.sync(&source, &destination))
    }

    async fn sync_task(&self, task: &Task) -> Result<SyncResult, DaemonError> {
        self.spawn_sync(task.source_path.clone(), task.destination_path.clone())
            .await
            .map_err(|e| join_err("sync", e))
    }

    /// The stored copy of `held`, or `None` once it has been removed.
    ///
    /// An unreadable task file is not a removal: the unit keeps its own copy
    /// unless the id was dropped from the active set.
    async fn current(&self, held: &Task) -> Result<Option<Task>, DaemonError> {
        let id = held.id.clone();
        match self.with_store(move |store| store.try_get(&id)).await? {
            Ok(found) => Ok(found),
            Err(err) if self.active.contains(&held.id) => {
                tracing::warn!(
                    task = %held.id,
                    error = %err,
                    "task file unreadable, running from scheduled copy",
                );
                Ok(Some(held.clone()))
            }
            Err(err) => {
                tracing::warn!(task = %held.id, error = %err, "task file unreadable");
                Ok(None)
            }
        }
    }

    fn record_run(&self, id: TaskId, ran_at: NaiveDateTime, recorded: bool, result: SyncResult) {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if runs.len() == RUN_HISTORY {
            runs.pop_front();
        }
        runs.push_back(RunRecord {
            id,
            ran_at,
            recorded,
            result,
        });
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, DaemonError>
    where
        T: Send + 'static,
        F: FnOnce(&TaskStore) -> T + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| join_err("task store", e))
    }
}

fn scheduled_instant(task: &Task) -> Result<NaiveDateTime, DaemonError> {
    task.scheduled().map_err(|source| DaemonError::InvalidSchedule {
        id: task.id.clone(),
        source,
    })
}
