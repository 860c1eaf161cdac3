//! The task document: one JSON array holding every task record.
//!
//! # Storage layout
//!
//! ```text
//! <data_dir>/
//!   sync_tasks.json       (pretty JSON array, created on first write)
//!   sync_tasks.json.tmp   (transient; renamed over the document)
//! ```
//!
//! # Concurrency
//!
//! Every operation is a whole-document read-modify-write. A mutex inside
//! [`TaskStore`] serializes them so concurrent updates from independent
//! execution units never lose each other's changes.
//!
//! # Failure policy
//!
//! The soft operations ([`TaskStore::load`], [`TaskStore::save`], `add`,
//! `remove`, `update`) log failures instead of returning them; their `try_`
//! twins report them, so callers can tell an unreadable document from a
//! missing record. When the document exists but cannot be read, mutations
//! skip the save rather than overwrite it with a partial collection.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::error::{io_err, StoreError};
use crate::types::{Task, TaskId, TaskUpdate};

/// File name of the task document inside the data directory.
pub const TASKS_FILE: &str = "sync_tasks.json";

/// Durable task collection backed by a single JSON document.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<dir>/sync_tasks.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TASKS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -----------------------------------------------------------------------
    // Load / save
    // -----------------------------------------------------------------------

    /// Read every record, migrating legacy ones.
    ///
    /// A missing document is an empty collection. If any record lacked `id`,
    /// `is_template` or `last_ran`, the migrated set is written back at once.
    pub fn try_load(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self.guard();
        self.read_document(true)
    }

    /// Read every record without touching the file. Legacy records are
    /// migrated in memory only.
    pub fn try_read(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self.guard();
        self.read_document(false)
    }

    /// [`TaskStore::try_load`], degrading to an empty collection on failure.
    pub fn load(&self) -> Vec<Task> {
        match self.try_load() {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!("Error loading tasks: {err}");
                Vec::new()
            }
        }
    }

    /// Replace the whole document with `tasks`.
    pub fn try_save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.write_document(tasks)
    }

    /// [`TaskStore::try_save`], logging instead of failing.
    pub fn save(&self, tasks: &[Task]) {
        if let Err(err) = self.try_save(tasks) {
            tracing::error!("Error saving tasks: {err}");
        }
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.load().into_iter().find(|t| &t.id == id)
    }

    /// Like [`TaskStore::get`], but an unreadable document is an error
    /// rather than an absent record.
    pub fn try_get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.try_load()?.into_iter().find(|t| &t.id == id))
    }

    pub fn add(&self, task: Task) {
        self.soft(self.try_mutate(|tasks| tasks.push(task)));
    }

    /// Returns `true` if a record with `id` was present.
    pub fn remove(&self, id: &TaskId) -> bool {
        self.soft(self.try_remove(id)).unwrap_or(false)
    }

    pub fn try_remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.try_mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| &t.id != id);
            tasks.len() != before
        })
    }

    /// Apply `update` to the record with `id`; returns the updated record.
    pub fn update(&self, id: &TaskId, update: TaskUpdate) -> Option<Task> {
        self.soft(self.try_update(id, update)).flatten()
    }

    /// `Ok(None)` only when the document was read and holds no such record.
    pub fn try_update(&self, id: &TaskId, update: TaskUpdate) -> Result<Option<Task>, StoreError> {
        self.try_mutate(|tasks| {
            let task = tasks.iter_mut().find(|t| &t.id == id)?;
            task.apply(&update);
            Some(task.clone())
        })
    }

    /// Load-modify-save under the store lock. Nothing is written when the
    /// document cannot be read.
    fn try_mutate<R>(&self, f: impl FnOnce(&mut Vec<Task>) -> R) -> Result<R, StoreError> {
        let _guard = self.guard();
        let mut tasks = self.read_document(true)?;
        let out = f(&mut tasks);
        self.write_document(&tasks)?;
        Ok(out)
    }

    fn soft<R>(&self, result: Result<R, StoreError>) -> Option<R> {
        match result {
            Ok(out) => Some(out),
            Err(err) => {
                tracing::error!("Error updating tasks: {err}");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers (caller holds the lock)
    // -----------------------------------------------------------------------

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_document(&self, persist_migration: bool) -> Result<Vec<Task>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        let raw: Vec<Map<String, Value>> =
            serde_json::from_str(&contents).map_err(|e| self.parse_err(e))?;

        let mut migrated = 0usize;
        let mut tasks = Vec::with_capacity(raw.len());
        for mut record in raw {
            if migrate_record(&mut record) {
                migrated += 1;
            }
            let task: Task =
                serde_json::from_value(Value::Object(record)).map_err(|e| self.parse_err(e))?;
            tasks.push(task);
        }

        if migrated > 0 && persist_migration {
            tracing::info!("Migrated {migrated} legacy task record(s)");
            self.write_document(&tasks)?;
        }
        Ok(tasks)
    }

    /// Write flow: serialize → `.json.tmp` sibling → `rename`.
    fn write_document(&self, tasks: &[Task]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }
        let json = serde_json::to_string_pretty(tasks)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }

    fn parse_err(&self, source: serde_json::Error) -> StoreError {
        StoreError::Parse {
            path: self.path.clone(),
            source,
        }
    }
}

/// Fill defaults for fields older documents lack. Returns `true` if changed.
fn migrate_record(record: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    if !record.contains_key("id") {
        record.insert("id".into(), Value::String(TaskId::generate().0));
        changed = true;
    }
    if !record.contains_key("is_template") {
        record.insert("is_template".into(), Value::Bool(false));
        changed = true;
    }
    if !record.contains_key("last_ran") {
        record.insert("last_ran".into(), Value::Null);
        changed = true;
    }
    changed
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn task(day: u32) -> Task {
        Task::one_time("/src/docs".into(), "/backup".into(), at(day))
    }

    #[test]
    fn missing_document_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(dir.path());
        assert!(store.try_load().unwrap().is_empty());
        assert!(!store.path().exists(), "load must not create the document");
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(&dir.path().join("nested").join("data"));
        store.save(&[task(1)]);
        assert!(store.path().exists());
    }

    #[test]
    fn add_then_get() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(dir.path());
        let t = task(2);
        store.add(t.clone());
        assert_eq!(store.get(&t.id), Some(t));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(dir.path());
        let t = task(3);
        store.add(t.clone());
        assert!(store.remove(&t.id));
        assert!(!store.remove(&t.id));
        assert!(store.load().is_empty());
    }

    #[test]
    fn update_unknown_id_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(dir.path());
        store.add(task(4));
        let updated = store.update(
            &TaskId::from("nope"),
            TaskUpdate {
                last_ran: Some(at(5)),
                ..TaskUpdate::default()
            },
        );
        assert!(updated.is_none());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::in_dir(dir.path());
        store.save(&[task(6)]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn migrate_record_fills_only_missing_fields() {
        let mut record: Map<String, Value> =
            serde_json::from_str(r#"{"id":"keep","source_path":"/a"}"#).unwrap();
        assert!(migrate_record(&mut record));
        assert_eq!(record["id"], Value::String("keep".into()));
        assert_eq!(record["is_template"], Value::Bool(false));
        assert_eq!(record["last_ran"], Value::Null);
        assert!(!migrate_record(&mut record), "second pass is a no-op");
    }
}
