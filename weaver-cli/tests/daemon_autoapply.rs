use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use weaver_apply::test_support::{branches, init_repo};

fn weaver_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_weaver"))
}

struct DaemonProcess {
    child: Child,
    root: PathBuf,
}

impl DaemonProcess {
    fn start(root: &Path) -> Self {
        let child = Command::new(weaver_bin())
            .current_dir(root)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            root: root.to_path_buf(),
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(weaver_bin())
            .current_dir(&self.root)
            .args(["daemon", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
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

fn daemon_status(root: &Path) -> Option<serde_json::Value> {
    let output = Command::new(weaver_bin())
        .current_dir(root)
        .args(["daemon", "status"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn daemon_running(root: &Path) -> bool {
    daemon_status(root)
        .and_then(|v| v["running"].as_bool())
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
fn saving_the_document_triggers_one_cycle() {
    let dir = TempDir::new().expect("repo");
    init_repo(dir.path());
    let doc = dir.path().join("weaver.md");
    fs::write(&doc, "").unwrap();

    let mut daemon = DaemonProcess::start(dir.path());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(dir.path())),
        "daemon did not report running state in time",
    );

    fs::write(
        &doc,
        "###FILE_START:notes/auto.txt###\nfrom the watcher\n###FILE_END:notes/auto.txt###\n",
    )
    .unwrap();

    let target = dir.path().join("notes/auto.txt");
    let applied = wait_until(Duration::from_secs(10), || {
        fs::read_to_string(&target)
            .map(|c| c == "from the watcher")
            .unwrap_or(false)
    });
    assert!(applied, "daemon did not apply the document within timeout");

    assert!(wait_until(Duration::from_secs(5), || {
        fs::read_to_string(&doc).map(|c| c.is_empty()).unwrap_or(false)
    }));
    // The clearing write must not start a second cycle.
    sleep(Duration::from_millis(1500));
    assert_eq!(branches(dir.path()).len(), 2);

    let status = daemon_status(dir.path()).expect("status");
    assert_eq!(status["cycles"]["completed"], 1);

    daemon.stop();
    assert!(!dir.path().join(".weaver/weaver.sock").exists());
}

#[test]
fn second_save_right_after_a_cycle_is_applied() {
    let dir = TempDir::new().expect("repo");
    init_repo(dir.path());
    let doc = dir.path().join("weaver.md");
    fs::write(&doc, "").unwrap();

    let mut daemon = DaemonProcess::start(dir.path());
    assert!(wait_until(Duration::from_secs(5), || daemon_running(
        dir.path()
    )));

    fs::write(&doc, "###FILE_START:one.txt###\none\n###FILE_END:one.txt###\n").unwrap();
    assert!(wait_until(Duration::from_secs(10), || {
        dir.path().join("one.txt").exists()
            && fs::read_to_string(&doc).map(|c| c.is_empty()).unwrap_or(false)
    }));

    // Well inside the debounce window of the first cycle.
    fs::write(&doc, "###FILE_START:two.txt###\ntwo\n###FILE_END:two.txt###\n").unwrap();
    let target = dir.path().join("two.txt");
    let applied = wait_until(Duration::from_secs(10), || {
        fs::read_to_string(&target)
            .map(|c| c == "two")
            .unwrap_or(false)
    });
    assert!(applied, "second edit was dropped");
    assert_eq!(branches(dir.path()).len(), 3);

    daemon.stop();
}

#[test]
fn socket_apply_runs_a_cycle_on_request() {
    let dir = TempDir::new().expect("repo");
    init_repo(dir.path());
    fs::write(dir.path().join("weaver.md"), "").unwrap();
    let mut daemon = DaemonProcess::start(dir.path());
    assert!(wait_until(Duration::from_secs(5), || daemon_running(
        dir.path()
    )));

    let output = Command::new(weaver_bin())
        .current_dir(dir.path())
        .args(["daemon", "apply"])
        .output()
        .expect("daemon apply");
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "skipped");
    assert_eq!(summary["source"], "socket");

    daemon.stop();
}
