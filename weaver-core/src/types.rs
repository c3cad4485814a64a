//! Domain types shared by the parser and the apply pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// FileUpdate
// ---------------------------------------------------------------------------

/// One whole-file replacement extracted from an instruction document.
///
/// Only [`crate::DirectiveParser`] constructs these, so every instance holds a
/// validated, project-relative path. Fields are private; an update is
/// immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    relative_path: PathBuf,
    content: String,
}

impl FileUpdate {
    pub(crate) fn new(relative_path: PathBuf, content: String) -> Self {
        Self {
            relative_path,
            content,
        }
    }

    /// Path relative to the project root, normalized (no `.` components).
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Replacement body for the whole file.
    pub fn content(&self) -> &str {
        &self.content
    }
}

// ---------------------------------------------------------------------------
// Relative path validation
// ---------------------------------------------------------------------------

/// Why a directive path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    Empty,
    Absolute,
    EscapesRoot,
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PathRejection::Empty => "path is empty",
            PathRejection::Absolute => "path is absolute",
            PathRejection::EscapesRoot => "path escapes the project root",
        };
        f.write_str(reason)
    }
}

/// Normalize a directive path into a clean project-relative path.
///
/// `./a/./b.txt` becomes `a/b.txt`. Absolute paths and any `..` component are
/// rejected outright rather than resolved.
pub fn normalize_relative(raw: &str) -> Result<PathBuf, PathRejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PathRejection::Empty);
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathRejection::EscapesRoot),
            Component::RootDir | Component::Prefix(_) => return Err(PathRejection::Absolute),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathRejection::Empty);
    }
    Ok(normalized)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
