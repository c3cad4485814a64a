//! Error types for weaver-apply.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single `git` subprocess.
#[derive(Debug, Error)]
pub enum GitError {
    /// The binary could not be launched at all (missing, not executable).
    #[error("failed to spawn `git {args}`: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    /// git ran and exited non-zero.
    #[error("`git {args}` failed: {stderr}")]
    Failed { args: String, stderr: String },

    /// A previous merge is still waiting for manual resolution.
    #[error("a merge is still in progress (unmerged: {}); resolve or abort it first", .unmerged.join(", "))]
    MergeInProgress { unmerged: Vec<String> },
}

/// All errors that can arise while applying an instruction document.
///
/// Per-file variants (`Backup*`, `WriteFailed`, `InvalidStagePath`,
/// `StageFailed`) are collected into the cycle summary. Cycle-level variants
/// (`ReadDocument`, `BranchCreationFailed`, `VcsFatal`, `InvalidState`) abort
/// the cycle.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to read instruction document {path}: {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to clear instruction document {path}: {source}")]
    ClearDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate backup name for this second is taken.
    #[error("backup name collision for {path} after {attempts} attempts")]
    BackupCollision { path: PathBuf, attempts: u32 },

    #[error("backup of {path} failed: {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write of {path} failed: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create update branch '{branch}': {source}")]
    BranchCreationFailed {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("cannot stage {path}: not present under the repository root")]
    InvalidStagePath { path: PathBuf },

    #[error("staging {path} failed: {source}")]
    StageFailed {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("version control session is {actual}; expected {expected}")]
    InvalidState {
        actual: &'static str,
        expected: &'static str,
    },

    /// Unexpected repository-level failure (git missing, not a repository).
    #[error("version control failure: {0}")]
    VcsFatal(#[from] GitError),

    #[error("failed to write outcome report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    /// True for errors that must stop the whole cycle.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            ApplyError::ReadDocument { .. }
                | ApplyError::BranchCreationFailed { .. }
                | ApplyError::InvalidState { .. }
                | ApplyError::VcsFatal(_)
        )
    }
}
