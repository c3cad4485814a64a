use std::path::{Path, PathBuf};
use std::time::Duration;

use weaver_core::config::WEAVER_DIR;

/// Quiet period after the last document event before a cycle is dispatched.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const PROCESS_LOG: &str = "weaver.log";
pub const DAEMON_SOCKET: &str = "weaver.sock";

/// `<project_root>/.weaver/weaver.sock`
pub fn socket_path(project_root: &Path) -> PathBuf {
    project_root.join(WEAVER_DIR).join(DAEMON_SOCKET)
}

/// `<logs_folder>/weaver.log`
pub fn process_log_path(logs_folder: &Path) -> PathBuf {
    logs_folder.join(PROCESS_LOG)
}
