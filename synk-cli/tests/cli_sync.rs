use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn synk(data: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("synk").expect("synk binary");
    cmd.arg("--data-dir").arg(data.path());
    cmd
}

#[test]
fn foreground_sync_copies_then_reports_identical() {
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let source = work.path().join("photos");
    let dest = work.path().join("backup");
    std::fs::create_dir_all(source.join("2024")).unwrap();
    std::fs::write(source.join("2024/beach.jpg"), b"jpeg").unwrap();
    std::fs::write(source.join("notes.txt"), b"hello").unwrap();
    std::fs::create_dir_all(&dest).unwrap();

    synk(&data)
        .arg("sync")
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 copied, 0 identical, 0 errors"));

    assert_eq!(
        std::fs::read(dest.join("photos/2024/beach.jpg")).unwrap(),
        b"jpeg"
    );

    synk(&data)
        .arg("sync")
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 copied, 2 identical, 0 errors"));
}

#[test]
fn missing_source_fails_with_context() {
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    synk(&data)
        .arg("sync")
        .arg(work.path().join("absent"))
        .arg(work.path().join("dest"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("source unavailable"));
}

#[test]
fn schedule_in_the_past_is_refused_locally() {
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    synk(&data)
        .args(["schedule"])
        .arg(work.path())
        .arg(work.path())
        .args(["--at", "2001-01-01 00:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please select a future time"));
}

#[test]
fn run_without_daemon_explains_how_to_start_it() {
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    synk(&data)
        .arg("run")
        .arg(work.path())
        .arg(work.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("synk daemon start"));
}
