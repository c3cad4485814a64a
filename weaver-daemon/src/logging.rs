//! Process-wide tracing setup.
//!
//! Human-readable records go to stderr; the same records are appended as JSON
//! lines to `<logs>/weaver.log`. `RUST_LOG` overrides the default `info`
//! filter.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};
use crate::paths::process_log_path;

/// Install the global subscriber. Returns the process log path.
///
/// Calling this more than once keeps the first subscriber.
pub fn init(logs_folder: &Path) -> Result<PathBuf, DaemonError> {
    fs::create_dir_all(logs_folder).map_err(|e| io_err(logs_folder, e))?;
    let path = process_log_path(logs_folder);
    let rotated = rotate_if_needed(&path, MAX_LOG_BYTES, MAX_ROTATED_FILES);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();

    match rotated {
        Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "log rotation failed"),
    }
    Ok(path)
}
