//! Pre-write snapshots of files about to be overwritten.
//!
//! A file at `<project_root>/<rel>/<stem><ext>` is copied to
//! `<backup_root>/<rel>/<stem>-<YYYYMMDDHHMMSS><ext>`. Backups are never
//! deleted or overwritten: when the timestamped name is taken (two backups of
//! the same file within one second) a counter is appended, giving
//! `<stem>-<ts>-1<ext>`, `<stem>-<ts>-2<ext>` and so on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use filetime::FileTime;

use crate::error::ApplyError;

pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Highest counter tried before giving up with [`ApplyError::BackupCollision`].
pub const MAX_COLLISION_SUFFIX: u32 = 999;

/// Copies files under `project_root` into a mirrored tree under `backup_root`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    project_root: PathBuf,
    backup_root: PathBuf,
}

impl BackupStore {
    pub fn new(project_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            backup_root: backup_root.into(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Snapshot `path` using the current local time.
    pub fn backup(&self, path: &Path) -> Result<PathBuf, ApplyError> {
        self.backup_at(path, Local::now())
    }

    /// Snapshot `path` stamped with `now`. Returns the backup file path.
    pub fn backup_at(&self, path: &Path, now: DateTime<Local>) -> Result<PathBuf, ApplyError> {
        let failed = |source: io::Error| ApplyError::BackupFailed {
            path: path.to_path_buf(),
            source,
        };

        let relative = path.strip_prefix(&self.project_root).map_err(|_| {
            failed(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not under project root {}", self.project_root.display()),
            ))
        })?;
        let mirrored = self.backup_root.join(relative);
        let (Some(dir), Some(stem)) = (mirrored.parent(), mirrored.file_stem()) else {
            return Err(failed(io::Error::new(
                ErrorKind::InvalidInput,
                "path has no file name",
            )));
        };
        let stem = stem.to_string_lossy();
        let ext = mirrored.extension().map(|e| e.to_string_lossy());

        let mut source = File::open(path).map_err(failed)?;
        let meta = source.metadata().map_err(failed)?;
        fs::create_dir_all(dir).map_err(failed)?;

        let stamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let (mut target, backup_path) = create_unique(dir, &stem, &stamp, ext.as_deref(), path)?;

        let copied = io::copy(&mut source, &mut target);
        drop(target);
        if let Err(err) = copied {
            let _ = fs::remove_file(&backup_path);
            return Err(failed(err));
        }

        fs::set_permissions(&backup_path, meta.permissions()).map_err(failed)?;
        filetime::set_file_times(
            &backup_path,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        )
        .map_err(failed)?;

        tracing::info!(
            source = %path.display(),
            backup = %backup_path.display(),
            "backed up file",
        );
        Ok(backup_path)
    }
}

/// `<stem>-<stamp>[-<n>][.<ext>]`
pub fn backup_file_name(stem: &str, stamp: &str, ext: Option<&str>, counter: u32) -> String {
    let mut name = format!("{stem}-{stamp}");
    if counter > 0 {
        name.push_str(&format!("-{counter}"));
    }
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Create a backup file that did not exist before, never truncating one.
fn create_unique(
    dir: &Path,
    stem: &str,
    stamp: &str,
    ext: Option<&str>,
    source: &Path,
) -> Result<(File, PathBuf), ApplyError> {
    for counter in 0..=MAX_COLLISION_SUFFIX {
        let candidate = dir.join(backup_file_name(stem, stamp, ext, counter));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((file, candidate)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(candidate = %candidate.display(), "backup name taken");
            }
            Err(err) => {
                return Err(ApplyError::BackupFailed {
                    path: source.to_path_buf(),
                    source: err,
                })
            }
        }
    }
    Err(ApplyError::BackupCollision {
        path: source.to_path_buf(),
        attempts: MAX_COLLISION_SUFFIX + 1,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn store(root: &TempDir) -> BackupStore {
        BackupStore::new(root.path(), root.path().join(".weaver").join("backups"))
    }

    #[test]
    fn file_name_inserts_stamp_before_extension() {
        assert_eq!(
            backup_file_name("x", "20240309140507", Some("md"), 0),
            "x-20240309140507.md"
        );
        assert_eq!(
            backup_file_name("archive.tar", "20240309140507", Some("gz"), 2),
            "archive.tar-20240309140507-2.gz"
        );
        assert_eq!(
            backup_file_name(".env", "20240309140507", None, 0),
            ".env-20240309140507"
        );
    }

    #[test]
    fn backup_mirrors_relative_layout() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("docs").join("guide.md");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "old").unwrap();

        let backup = store(&root).backup_at(&file, fixed_now()).unwrap();

        assert_eq!(
            backup,
            root.path()
                .join(".weaver/backups/docs/guide-20240309140507.md")
        );
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old");
    }

    #[test]
    fn same_second_backups_never_overwrite() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("x.md");
        let backups = store(&root);

        fs::write(&file, "first").unwrap();
        let first = backups.backup_at(&file, fixed_now()).unwrap();
        fs::write(&file, "second").unwrap();
        let second = backups.backup_at(&file, fixed_now()).unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("x-20240309140507-1.md"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second");
    }

    #[test]
    fn backup_preserves_modification_time() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("old.txt");
        fs::write(&file, "data").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600 * 24);
        filetime::set_file_mtime(&file, FileTime::from_system_time(past)).unwrap();

        let backup = store(&root).backup_at(&file, fixed_now()).unwrap();

        let original = FileTime::from_last_modification_time(&fs::metadata(&file).unwrap());
        let copied = FileTime::from_last_modification_time(&fs::metadata(&backup).unwrap());
        assert_eq!(original.unix_seconds(), copied.unix_seconds());
    }

    #[test]
    fn missing_source_is_backup_failed_and_leaves_no_file() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("ghost.md");

        let err = store(&root).backup_at(&missing, fixed_now()).unwrap_err();
        assert!(matches!(err, ApplyError::BackupFailed { .. }), "got: {err}");
        assert!(!root.path().join(".weaver/backups/ghost-20240309140507.md").exists());
    }

    #[test]
    fn unreadable_source_leaves_no_partial_backup() {
        let root = TempDir::new().unwrap();
        // Opening a directory succeeds on unix; reading it does not.
        let dir = root.path().join("notes");
        fs::create_dir_all(&dir).unwrap();

        let err = store(&root).backup_at(&dir, fixed_now()).unwrap_err();

        assert!(matches!(err, ApplyError::BackupFailed { .. }), "got: {err}");
        assert!(!root.path().join(".weaver/backups/notes-20240309140507").exists());
    }

    #[test]
    fn path_outside_project_root_is_rejected() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let file = elsewhere.path().join("x.md");
        fs::write(&file, "x").unwrap();

        let err = store(&root).backup_at(&file, fixed_now()).unwrap_err();
        assert!(matches!(err, ApplyError::BackupFailed { .. }));
    }
}
