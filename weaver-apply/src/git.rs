//! Git adapter.
//!
//! Update branches are created, committed and merged through the `git`
//! binary, so we keep a small, explicit wrapper around subprocess calls. Each
//! method maps to exactly one git invocation.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument};

use crate::error::GitError;

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Path of the `.git` directory; fails when `workdir` is not a repository.
    pub fn git_dir(&self) -> Result<PathBuf, GitError> {
        let out = self.run_capture(&["rev-parse", "--git-dir"])?;
        Ok(self.workdir.join(out.trim()))
    }

    /// Current branch name, or `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// True while a merge is stopped waiting for resolution (`MERGE_HEAD`
    /// set or unmerged index entries).
    pub fn merge_in_progress(&self) -> Result<bool, GitError> {
        let merge_head = self
            .run(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])?
            .status
            .success();
        if merge_head {
            return Ok(true);
        }
        Ok(!self.unmerged_paths()?.is_empty())
    }

    /// Paths with unresolved conflicts in the index.
    pub fn unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let out = self.run_capture(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<(), GitError> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Stage one path (relative to the working directory).
    pub fn add(&self, path: &Path) -> Result<(), GitError> {
        let path = path.to_string_lossy();
        self.run_checked(&["add", "--", path.as_ref()])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(!out.trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool, GitError> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Merge `branch` into the current branch without opening an editor.
    #[instrument(skip_all, fields(branch))]
    pub fn merge(&self, branch: &str) -> Result<(), GitError> {
        debug!(branch, "merging branch");
        self.run_checked(&["merge", "--no-edit", branch])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            // `git merge` reports conflicts on stdout.
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GitError::Failed {
                args: args.join(" "),
                stderr: detail,
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| GitError::Spawn {
                args: args.join(" "),
                source,
            })
    }
}
