use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use chrono::Local;
use synk_core::TaskStore;
use tempfile::TempDir;

fn synk_bin_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("synk")
}

fn synk(data_dir: &Path) -> Command {
    let mut cmd = Command::new(synk_bin_path());
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

struct DaemonProcess {
    child: Child,
    data_dir: PathBuf,
}

impl DaemonProcess {
    fn start(data_dir: &Path) -> Self {
        let child = synk(data_dir)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn stop(&mut self) {
        let _ = synk(&self.data_dir).args(["daemon", "stop"]).status();

        let deadline = Instant::now() + Duration::from_secs(8);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_running(data_dir: &Path) -> bool {
    let Ok(output) = synk(data_dir).args(["daemon", "status"]).output() else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .ok()
        .and_then(|v| v.get("running").and_then(|r| r.as_bool()))
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn scheduled_one_time_sync_runs_through_daemon() {
    let data = TempDir::new().expect("data");
    let work = TempDir::new().expect("work");
    let source = work.path().join("projects");
    let dest = work.path().join("mirror");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("plan.md"), "# plan").unwrap();

    let mut daemon = DaemonProcess::start(data.path());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(data.path())),
        "daemon did not report running state in time",
    );

    let at = (Local::now().naive_local() + chrono::Duration::seconds(3))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let output = synk(data.path())
        .arg("schedule")
        .arg(&source)
        .arg(&dest)
        .args(["--at", &at])
        .output()
        .expect("run synk schedule");
    assert!(
        output.status.success(),
        "schedule failed: {}",
        String::from_utf8_lossy(&output.stderr),
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("sync scheduled for"));
    assert_eq!(TaskStore::in_dir(data.path()).load().len(), 1);

    let copied = dest.join("projects/plan.md");
    assert!(
        wait_until(Duration::from_secs(10), || copied.exists()),
        "scheduled sync did not run within timeout",
    );
    assert!(
        wait_until(Duration::from_secs(5), || TaskStore::in_dir(data.path())
            .load()
            .is_empty()),
        "one-time task should be removed after running",
    );

    daemon.stop();
    assert!(!data.path().join("synk.sock").exists());
    let log = std::fs::read_to_string(data.path().join("logs/sync_service.log")).unwrap();
    assert!(log.contains("Sync completed - Copied: 1"));
}
