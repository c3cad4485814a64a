//! Branch-and-merge session over one git repository.
//!
//! ```text
//! Idle ──create_update_branch──▶ OnBranch ──stage(path)*──▶ OnBranch
//!                                   │
//!                              merge_branch
//!                                   ├──▶ Merged
//!                                   └──▶ ConflictPending
//! Merged | ConflictPending ──reset──▶ Idle
//! ```
//!
//! Expected git outcomes (a conflicting merge, a refused checkout of the
//! primary branch) never surface as `Err`: `merge_branch` reports them as
//! [`MergeOutcome::ManualIntervention`]. Only a git binary that cannot be
//! spawned or a directory that is not a repository is [`ApplyError::VcsFatal`].

use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::{ApplyError, GitError};
use crate::git::Git;

pub const BRANCH_PREFIX: &str = "ai-update-";
pub const BRANCH_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Highest numeric suffix tried when `ai-update-<ts>` already exists.
const MAX_BRANCH_SUFFIX: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    OnBranch { branch: String },
    Merged { branch: String },
    ConflictPending { branch: String },
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::OnBranch { .. } => "on an update branch",
            SessionState::Merged { .. } => "merged",
            SessionState::ConflictPending { .. } => "waiting for conflict resolution",
        }
    }
}

/// Result of folding an update branch back into the primary branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    ManualIntervention { reason: String },
}

impl MergeOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, MergeOutcome::Merged)
    }

    /// Label used in cycle summaries.
    pub fn status_label(&self) -> &'static str {
        match self {
            MergeOutcome::Merged => "Automatic",
            MergeOutcome::ManualIntervention { .. } => "Manual intervention required",
        }
    }
}

/// One repository, one update cycle at a time.
#[derive(Debug)]
pub struct VersionControlSession {
    git: Git,
    primary_branch: String,
    state: SessionState,
}

impl VersionControlSession {
    /// Open a session on the repository at `root`.
    ///
    /// Fails with [`ApplyError::VcsFatal`] if git is unavailable or `root`
    /// is not inside a repository.
    pub fn open(root: &Path, primary_branch: impl Into<String>) -> Result<Self, ApplyError> {
        let git = Git::new(root);
        git.git_dir()?;
        Ok(Self {
            git,
            primary_branch: primary_branch.into(),
            state: SessionState::Idle,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn primary_branch(&self) -> &str {
        &self.primary_branch
    }

    /// `Idle → OnBranch`, branch named from the current local time.
    pub fn create_update_branch(&mut self) -> Result<String, ApplyError> {
        self.create_update_branch_at(Local::now())
    }

    /// `Idle → OnBranch`, branch named `ai-update-<now>`.
    ///
    /// If that ref already exists (two cycles within one second) a counter is
    /// appended: `ai-update-<now>-1`.
    ///
    /// Refuses with [`ApplyError::BranchCreationFailed`] while an earlier
    /// conflicted merge is still unresolved in the working tree.
    pub fn create_update_branch_at(&mut self, now: DateTime<Local>) -> Result<String, ApplyError> {
        self.expect_idle()?;

        let base = format!("{BRANCH_PREFIX}{}", now.format(BRANCH_TIMESTAMP_FORMAT));
        if self.git.merge_in_progress()? {
            let unmerged = self.git.unmerged_paths()?;
            tracing::error!(
                unmerged = ?unmerged,
                "previous merge is unresolved; refusing to start a new update branch",
            );
            return Err(ApplyError::BranchCreationFailed {
                branch: base,
                source: GitError::MergeInProgress { unmerged },
            });
        }
        let branch = self.unused_branch_name(&base)?;
        let from = self
            .git
            .current_branch()
            .unwrap_or_else(|_| "HEAD".to_string());

        match self.git.checkout_new_branch(&branch) {
            Ok(()) => {}
            Err(err @ GitError::Spawn { .. }) => return Err(ApplyError::VcsFatal(err)),
            Err(source) => return Err(ApplyError::BranchCreationFailed { branch, source }),
        }

        tracing::info!(branch = %branch, from = %from, "created update branch");
        self.state = SessionState::OnBranch {
            branch: branch.clone(),
        };
        Ok(branch)
    }

    /// Stage one project-relative path on the update branch.
    pub fn stage(&mut self, relative: &Path) -> Result<(), ApplyError> {
        self.expect_on_branch()?;

        if !self.git.workdir().join(relative).exists() {
            return Err(ApplyError::InvalidStagePath {
                path: relative.to_path_buf(),
            });
        }

        match self.git.add(relative) {
            Ok(()) => Ok(()),
            Err(err @ GitError::Spawn { .. }) => Err(ApplyError::VcsFatal(err)),
            Err(source) => Err(ApplyError::StageFailed {
                path: relative.to_path_buf(),
                source,
            }),
        }
    }

    /// Commit staged changes on `branch`, checkout the primary branch and
    /// merge `branch` into it.
    ///
    /// `OnBranch → Merged` on success, `OnBranch → ConflictPending` on any git
    /// failure along the way. A conflicted merge is left in progress so it
    /// can be resolved by hand.
    pub fn merge_branch(&mut self, branch: &str) -> Result<MergeOutcome, ApplyError> {
        let current = self.expect_on_branch()?;
        if current != branch {
            return Err(ApplyError::InvalidState {
                actual: "on a different update branch",
                expected: "on the branch being merged",
            });
        }

        let outcome = match self.integrate(branch) {
            Ok(()) => MergeOutcome::Merged,
            Err(err @ GitError::Spawn { .. }) => return Err(ApplyError::VcsFatal(err)),
            Err(err) => MergeOutcome::ManualIntervention {
                reason: err.to_string(),
            },
        };

        self.state = match &outcome {
            MergeOutcome::Merged => {
                tracing::info!(
                    branch,
                    primary = %self.primary_branch,
                    "merged update branch",
                );
                SessionState::Merged {
                    branch: branch.to_string(),
                }
            }
            MergeOutcome::ManualIntervention { reason } => {
                tracing::warn!(
                    branch,
                    primary = %self.primary_branch,
                    reason = %reason,
                    "merge needs manual intervention",
                );
                SessionState::ConflictPending {
                    branch: branch.to_string(),
                }
            }
        };
        Ok(outcome)
    }

    /// Forget the finished cycle. Repository state is left as it is.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
    }

    fn integrate(&self, branch: &str) -> Result<(), GitError> {
        self.git
            .commit_staged(&format!("weaver: apply instruction updates ({branch})"))?;
        self.git.checkout_branch(&self.primary_branch)?;
        self.git.merge(branch)?;
        Ok(())
    }

    fn unused_branch_name(&self, base: &str) -> Result<String, ApplyError> {
        if !self.git.branch_exists(base)? {
            return Ok(base.to_string());
        }
        for n in 1..=MAX_BRANCH_SUFFIX {
            let candidate = format!("{base}-{n}");
            if !self.git.branch_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        // Let git report the clash.
        Ok(base.to_string())
    }

    fn expect_idle(&self) -> Result<(), ApplyError> {
        match self.state {
            SessionState::Idle => Ok(()),
            ref other => Err(ApplyError::InvalidState {
                actual: other.name(),
                expected: SessionState::Idle.name(),
            }),
        }
    }

    fn expect_on_branch(&self) -> Result<String, ApplyError> {
        match &self.state {
            SessionState::OnBranch { branch } => Ok(branch.clone()),
            other => Err(ApplyError::InvalidState {
                actual: other.name(),
                expected: "on an update branch",
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
