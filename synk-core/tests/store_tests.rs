//! Task document migration, soft-failure and concurrency tests.

use std::sync::Arc;
use std::thread;

use assert_fs::prelude::*;
use chrono::NaiveDate;
use predicates::prelude::predicate;
use rstest::rstest;
use synk_core::{StoreError, Task, TaskId, TaskStore, TaskUpdate, TASKS_FILE};

fn at(hour: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 20)
        .expect("date")
        .and_hms_opt(hour, 0, 0)
        .expect("time")
}

// ---------------------------------------------------------------------------
// 1. Legacy migration
// ---------------------------------------------------------------------------

#[rstest]
#[case::missing_everything(
    r#"[{"source_path":"/a","destination_path":"/b","scheduled_datetime":"2024-05-01T10:30:00","is_repeat":false}]"#
)]
#[case::missing_id(
    r#"[{"source_path":"/a","destination_path":"/b","scheduled_datetime":"2024-05-01T10:30:00","is_repeat":false,"is_template":false,"last_ran":null}]"#
)]
#[case::missing_last_ran(
    r#"[{"id":"legacy-1","source_path":"/a","destination_path":"/b","scheduled_datetime":"2024-05-01T10:30:00","is_repeat":true,"is_template":false}]"#
)]
fn legacy_records_are_migrated_and_rewritten(#[case] document: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(TASKS_FILE);
    file.write_str(document).expect("seed");

    let store = TaskStore::in_dir(home.path());
    let tasks = store.try_load().expect("load");
    assert_eq!(tasks.len(), 1);
    assert!(!tasks[0].id.0.is_empty());
    assert!(!tasks[0].is_template);
    assert_eq!(tasks[0].last_ran, None);

    file.assert(predicate::str::contains("\"is_template\": false"));
    file.assert(predicate::str::contains("\"last_ran\": null"));
    file.assert(predicate::str::contains("\"id\""));

    // Migration runs at most once: a second load keeps the same id.
    let again = store.try_load().expect("reload");
    assert_eq!(again[0].id, tasks[0].id);
}

#[test]
fn current_records_are_not_rewritten() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(TASKS_FILE);
    let compact = r#"[{"id":"x","source_path":"/a","destination_path":"/b","scheduled_datetime":"2024-05-01T10:30:00","is_repeat":false,"is_template":true,"last_ran":null}]"#;
    file.write_str(compact).expect("seed");

    TaskStore::in_dir(home.path()).try_load().expect("load");
    file.assert(compact);
}

// ---------------------------------------------------------------------------
// 2. Soft failure
// ---------------------------------------------------------------------------

#[test]
fn corrupt_document_loads_empty_and_is_not_overwritten() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(TASKS_FILE);
    file.write_str("{ not json ]").expect("seed");

    let store = TaskStore::in_dir(home.path());
    assert!(matches!(store.try_load(), Err(StoreError::Parse { .. })));
    assert!(store.load().is_empty());

    store.add(Task::one_time("/a".into(), "/b".into(), at(9)));
    file.assert("{ not json ]");
}

#[test]
fn unreadable_document_is_distinct_from_missing_record() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(TASKS_FILE);
    let store = TaskStore::in_dir(home.path());
    let id = TaskId::from("gone".to_string());
    let stamp = TaskUpdate {
        scheduled_datetime: None,
        last_ran: Some(at(8)),
    };

    assert!(matches!(store.try_get(&id), Ok(None)));
    assert!(matches!(store.try_update(&id, stamp.clone()), Ok(None)));

    file.write_str("{ not json ]").expect("seed");
    assert!(matches!(store.try_get(&id), Err(StoreError::Parse { .. })));
    assert!(matches!(store.try_update(&id, stamp), Err(StoreError::Parse { .. })));
    assert!(store.try_remove(&id).is_err());
    file.assert("{ not json ]");
}

#[test]
fn read_only_load_migrates_in_memory_only() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(TASKS_FILE);
    let legacy = r#"[{"source_path":"/a","destination_path":"/b","scheduled_datetime":"2024-05-01T10:30:00","is_repeat":false}]"#;
    file.write_str(legacy).expect("seed");

    let tasks = TaskStore::in_dir(home.path()).try_read().expect("read");
    assert_eq!(tasks.len(), 1);
    assert!(!tasks[0].id.0.is_empty());
    assert!(!tasks[0].is_template);
    file.assert(legacy);
}

#[test]
fn malformed_schedule_survives_load_and_save() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(TASKS_FILE)
        .write_str(
            r#"[{"id":"bad","source_path":"/a","destination_path":"/b","scheduled_datetime":"soon","is_repeat":false,"is_template":false,"last_ran":null}]"#,
        )
        .expect("seed");

    let store = TaskStore::in_dir(home.path());
    let tasks = store.try_load().expect("load");
    assert!(tasks[0].scheduled().is_err());

    store.add(Task::one_time("/c".into(), "/d".into(), at(10)));
    let tasks = store.try_load().expect("reload");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].scheduled_datetime.0, "soon");
}

// ---------------------------------------------------------------------------
// 3. Updates
// ---------------------------------------------------------------------------

#[test]
fn update_persists_partial_fields() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = TaskStore::in_dir(home.path());
    let task = Task::repeating("/a".into(), "/b".into(), at(6));
    store.add(task.clone());

    let updated = store
        .update(
            &task.id,
            TaskUpdate {
                scheduled_datetime: Some(at(7)),
                last_ran: Some(at(6)),
            },
        )
        .expect("updated");
    assert_eq!(updated.scheduled().expect("parse"), at(7));

    let reloaded = store.get(&task.id).expect("present");
    assert_eq!(reloaded.last_ran, Some(at(6)));
    assert_eq!(reloaded.source_path, task.source_path);
}

#[test]
fn concurrent_mutations_do_not_lose_writes() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::in_dir(home.path()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut task = Task::one_time(format!("/src/{i}").into(), "/dst".into(), at(12));
                task.id = TaskId::from(format!("task-{i}"));
                store.add(task);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let mut ids: Vec<String> = store.load().into_iter().map(|t| t.id.0).collect();
    ids.sort();
    assert_eq!(ids.len(), 8, "every concurrent add must survive");
}
