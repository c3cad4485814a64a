//! Whole-file writer.
//!
//! ## `write_file` protocol
//!
//! 1. Create missing parent directories.
//! 2. Write the full content to `<path>.weaver.tmp`.
//! 3. Copy permissions of the file being replaced onto the temp file.
//! 4. Rename over the final path (atomic on POSIX).
//!
//! A failed rename removes the temp file and leaves the original untouched.

use std::path::{Path, PathBuf};

use crate::error::ApplyError;

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The file did not exist before.
    Created { path: PathBuf },
    /// An existing file was overwritten.
    Replaced { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Created { path } | WriteResult::Replaced { path } => path,
        }
    }
}

/// Replace the whole content of `path` with `content`.
pub fn write_file(path: &Path, content: &str) -> Result<WriteResult, ApplyError> {
    let tmp = PathBuf::from(format!("{}.weaver.tmp", path.display()));
    write_file_with_tmp(path, content, &tmp)
}

fn write_file_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, ApplyError> {
    let write_err = |source| ApplyError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let existing = std::fs::metadata(path).ok();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(write_err)?;
    }
    std::fs::write(tmp, content).map_err(write_err)?;

    if let Some(meta) = &existing {
        if let Err(e) = std::fs::set_permissions(tmp, meta.permissions()) {
            let _ = std::fs::remove_file(tmp);
            return Err(write_err(e));
        }
    }

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(write_err(e));
    }

    tracing::debug!(path = %path.display(), bytes = content.len(), "wrote file");
    Ok(match existing {
        Some(_) => WriteResult::Replaced {
            path: path.to_path_buf(),
        },
        None => WriteResult::Created {
            path: path.to_path_buf(),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_write_returns_created() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("new.md");
        let result = write_file(&path, "hello").unwrap();
        assert!(matches!(result, WriteResult::Created { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn overwrite_replaces_whole_body() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file.md");
        fs::write(&path, "a much longer original body").unwrap();

        let result = write_file(&path, "short").unwrap();
        assert!(matches!(result, WriteResult::Replaced { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("src").join("bin").join("tool.rs");
        write_file(&path, "fn main() {}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.md");
        write_file(&path, "data").unwrap();
        let tmp_path = PathBuf::from(format!("{}.weaver.tmp", path.display()));
        assert!(!tmp_path.exists(), ".weaver.tmp must be cleaned up");
    }

    #[test]
    #[cfg(unix)]
    fn replacing_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_file(&path, "#!/bin/sh\necho hi\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("file.md");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("file.md.weaver.tmp");

        let result = write_file_with_tmp(&path, "new content", &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root ignores directory permissions; only assert when the rename failed.
        if let Err(err) = result {
            assert!(matches!(err, ApplyError::WriteFailed { .. }));
            let current = fs::read_to_string(&path).unwrap();
            assert_eq!(current, "original", "original file should be intact");
            assert!(!tmp_path.exists(), ".weaver.tmp should be cleaned up");
        }
    }
}
