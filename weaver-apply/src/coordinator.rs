//! One update cycle: parse → backup → write → stage → merge → report → clear.
//!
//! Per-file failures (backup, write, stage) are recorded in the
//! [`UpdateCycle`] and the remaining updates still run. Files written before
//! a failure stay written; there is no rollback across files.
//!
//! Cycle-level failures (unreadable document, branch creation, fatal git
//! errors) return `Err` and leave the instruction document untouched so the
//! same directives can be retried.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use weaver_core::{FileUpdate, ParseWarning, WeaverConfig};

use crate::backup::BackupStore;
use crate::editor::{CommandEditor, Editor};
use crate::error::ApplyError;
use crate::report::OutcomeReporter;
use crate::vcs::{MergeOutcome, VersionControlSession};
use crate::writer::{write_file, WriteResult};

// ---------------------------------------------------------------------------
// Cycle records
// ---------------------------------------------------------------------------

/// Step at which a single file update failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Backup,
    Write,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStage::Backup => "backup",
            FileStage::Write => "write",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Written {
        /// The file did not exist before this cycle.
        created: bool,
        backup: Option<PathBuf>,
    },
    /// On disk, but `git add` refused it, so the update branch does not carry it.
    WrittenUnstaged {
        created: bool,
        backup: Option<PathBuf>,
        message: String,
    },
    Failed {
        stage: FileStage,
        message: String,
    },
}

/// What happened to one [`FileUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub relative_path: PathBuf,
    pub status: FileStatus,
}

impl FileOutcome {
    fn failed(relative_path: &Path, stage: FileStage, err: &ApplyError) -> Self {
        tracing::warn!(
            path = %relative_path.display(),
            stage = %stage,
            error = %err,
            "file update failed",
        );
        Self {
            relative_path: relative_path.to_path_buf(),
            status: FileStatus::Failed {
                stage,
                message: err.to_string(),
            },
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(
            self.status,
            FileStatus::Written { .. } | FileStatus::WrittenUnstaged { .. }
        )
    }

    pub fn is_staged(&self) -> bool {
        matches!(self.status, FileStatus::Written { .. })
    }
}

/// Everything one cycle did, handed to the reporter and back to the caller.
#[derive(Debug, Clone)]
pub struct UpdateCycle {
    pub branch_name: String,
    pub updates: Vec<FileUpdate>,
    /// One entry per update, same order.
    pub files: Vec<FileOutcome>,
    pub merge: MergeOutcome,
    pub warnings: Vec<ParseWarning>,
    pub document_cleared: bool,
}

impl UpdateCycle {
    pub fn merge_succeeded(&self) -> bool {
        self.merge.succeeded()
    }

    /// Relative paths written in this cycle, in application order.
    pub fn updated_paths(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter(|f| f.is_written())
            .map(|f| f.relative_path.as_path())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.is_written())
    }

    /// Written to disk but left out of the update branch.
    pub fn unstaged(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| f.is_written() && !f.is_staged())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Document is empty or whitespace only (including our own clearing write).
    EmptyDocument,
    /// Document has text but no complete directive block.
    NoDirectives,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::EmptyDocument => "instruction document is empty",
            SkipReason::NoDirectives => "instruction document has no complete directive blocks",
        })
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(UpdateCycle),
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Applies instruction documents to the project described by a
/// [`WeaverConfig`]. Not `Sync`: callers serialize access to it.
pub struct UpdateCoordinator {
    config: WeaverConfig,
    backups: BackupStore,
    vcs: VersionControlSession,
    reporter: OutcomeReporter,
    editor: Box<dyn Editor>,
}

impl UpdateCoordinator {
    /// Coordinator using the configured editor command.
    pub fn new(config: WeaverConfig) -> Result<Self, ApplyError> {
        let editor = CommandEditor::new(config.editor_command.clone());
        Self::with_editor(config, Box::new(editor))
    }

    pub fn with_editor(config: WeaverConfig, editor: Box<dyn Editor>) -> Result<Self, ApplyError> {
        let vcs = VersionControlSession::open(&config.project_root, config.primary_branch.clone())?;
        Ok(Self {
            backups: BackupStore::new(&config.project_root, &config.backups_folder),
            reporter: OutcomeReporter::new(&config.logs_folder),
            vcs,
            editor,
            config,
        })
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Run one cycle for `document` using the current local time.
    pub fn handle(&mut self, document: &Path) -> Result<CycleOutcome, ApplyError> {
        self.handle_at(document, Local::now())
    }

    /// Run one cycle for `document`; `now` stamps the branch and backups.
    pub fn handle_at(
        &mut self,
        document: &Path,
        now: DateTime<Local>,
    ) -> Result<CycleOutcome, ApplyError> {
        tracing::info!(document = %document.display(), "change detected");

        let text = std::fs::read_to_string(document).map_err(|source| ApplyError::ReadDocument {
            path: document.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            tracing::info!(document = %document.display(), "document is empty; skipping");
            return Ok(CycleOutcome::Skipped(SkipReason::EmptyDocument));
        }

        let parsed = self.config.directive_parser(document).parse(&text);
        for warning in &parsed.warnings {
            tracing::warn!(document = %document.display(), %warning, "malformed directive");
        }
        if parsed.is_empty() {
            tracing::info!(document = %document.display(), "no directives found; skipping");
            return Ok(CycleOutcome::Skipped(SkipReason::NoDirectives));
        }

        let branch = match self.vcs.create_update_branch_at(now) {
            Ok(branch) => branch,
            Err(err) => {
                tracing::error!(error = %err, "cannot start update cycle");
                self.vcs.reset();
                return Err(err);
            }
        };

        let result = self.run_cycle(document, branch, parsed.updates, parsed.warnings, now);
        self.vcs.reset();
        result.map(CycleOutcome::Completed)
    }

    fn run_cycle(
        &mut self,
        document: &Path,
        branch: String,
        updates: Vec<FileUpdate>,
        warnings: Vec<ParseWarning>,
        now: DateTime<Local>,
    ) -> Result<UpdateCycle, ApplyError> {
        let span = tracing::info_span!("cycle", branch = %branch);
        let _enter = span.enter();

        let mut files = Vec::with_capacity(updates.len());
        for update in &updates {
            match self.apply_update(update, now) {
                Ok(outcome) => files.push(outcome),
                Err(err) => {
                    tracing::error!(
                        path = %update.relative_path().display(),
                        error = %err,
                        "aborting cycle",
                    );
                    return Err(err);
                }
            }
        }

        let merge = self.vcs.merge_branch(&branch).inspect_err(|err| {
            tracing::error!(error = %err, "merge aborted");
        })?;
        if !merge.succeeded() {
            tracing::warn!("merge conflicts detected; opening editor for resolution");
            self.editor.open(&self.config.project_root);
        }

        let mut cycle = UpdateCycle {
            branch_name: branch,
            updates,
            files,
            merge,
            warnings,
            document_cleared: false,
        };

        match self.reporter.report(&cycle) {
            Ok(path) => tracing::info!(log = %path.display(), "wrote update summary"),
            Err(err) => tracing::warn!(error = %err, "failed to write update summary"),
        }

        match std::fs::write(document, "") {
            Ok(()) => cycle.document_cleared = true,
            Err(source) => {
                let err = ApplyError::ClearDocument {
                    path: document.to_path_buf(),
                    source,
                };
                tracing::error!(error = %err, "instruction document was not cleared");
            }
        }

        tracing::info!(
            written = cycle.updated_paths().count(),
            unstaged = cycle.unstaged().count(),
            failed = cycle.failures().count(),
            merge = cycle.merge.status_label(),
            "update cycle finished",
        );
        Ok(cycle)
    }

    /// Backup, write and stage one update. Only cycle-fatal errors are `Err`.
    fn apply_update(
        &mut self,
        update: &FileUpdate,
        now: DateTime<Local>,
    ) -> Result<FileOutcome, ApplyError> {
        let relative = update.relative_path();
        let target = self.config.project_root.join(relative);

        let mut backup = None;
        if target.exists() {
            match self.backups.backup_at(&target, now) {
                Ok(path) => backup = Some(path),
                // Never overwrite a file we could not snapshot.
                Err(err) => return Ok(FileOutcome::failed(relative, FileStage::Backup, &err)),
            }
        }

        let written = match write_file(&target, update.content()) {
            Ok(written) => written,
            Err(err) => return Ok(FileOutcome::failed(relative, FileStage::Write, &err)),
        };

        let created = matches!(written, WriteResult::Created { .. });
        let status = match self.vcs.stage(relative) {
            Ok(()) => {
                tracing::info!(path = %relative.display(), "applied update");
                FileStatus::Written { created, backup }
            }
            Err(err) if err.is_cycle_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    path = %relative.display(),
                    error = %err,
                    "file written but not staged",
                );
                FileStatus::WrittenUnstaged {
                    created,
                    backup,
                    message: err.to_string(),
                }
            }
        };

        Ok(FileOutcome {
            relative_path: relative.to_path_buf(),
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
