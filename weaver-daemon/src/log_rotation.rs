//! Size-based rotation of the process log.
//!
//! `weaver.log` → `weaver.log.1` → … → `weaver.log.5`; the oldest copy is
//! deleted. Runs once at startup, before the log file is opened.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if it is at least `max_bytes` long.
///
/// Returns `true` if a rotation happened. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::PROCESS_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("weaver.log");
        fs::write(&log, "short").unwrap();

        assert!(!rotate_if_needed(&log, 1024, MAX_ROTATED_FILES).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("weaver.log");
        assert!(!rotate_if_needed(&log, 1, MAX_ROTATED_FILES).unwrap());
    }

    #[test]
    fn oversized_file_moves_to_dot_one() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("weaver.log");
        fs::write(&log, vec![b'x'; 2048]).unwrap();

        assert!(rotate_if_needed(&log, 1024, MAX_ROTATED_FILES).unwrap());
        assert!(!log.exists());
        assert_eq!(fs::metadata(numbered_path(&log, 1)).unwrap().len(), 2048);
    }

    #[test]
    fn rotated_copies_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("weaver.log");
        for n in 1..=MAX_ROTATED_FILES {
            fs::write(numbered_path(&log, n), format!("rotated-{n}")).unwrap();
        }
        fs::write(&log, vec![b'x'; 2048]).unwrap();

        rotate_if_needed(&log, 1024, MAX_ROTATED_FILES).unwrap();

        assert_eq!(
            fs::read_to_string(numbered_path(&log, MAX_ROTATED_FILES)).unwrap(),
            format!("rotated-{}", MAX_ROTATED_FILES - 1)
        );
        assert!(!numbered_path(&log, MAX_ROTATED_FILES + 1).exists());
    }
}
