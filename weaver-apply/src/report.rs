//! Per-cycle summary log: `<logs>/update_<branch>.log`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::coordinator::{FileStatus, UpdateCycle};
use crate::error::ApplyError;

pub struct OutcomeReporter {
    logs_folder: PathBuf,
}

impl OutcomeReporter {
    pub fn new(logs_folder: impl Into<PathBuf>) -> Self {
        Self {
            logs_folder: logs_folder.into(),
        }
    }

    pub fn log_path(&self, branch: &str) -> PathBuf {
        self.logs_folder.join(format!("update_{branch}.log"))
    }

    /// Write the summary of `cycle`, creating the logs folder if needed.
    pub fn report(&self, cycle: &UpdateCycle) -> Result<PathBuf, ApplyError> {
        let path = self.log_path(&cycle.branch_name);
        let wrap = |source| ApplyError::Report {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.logs_folder).map_err(wrap)?;
        std::fs::write(&path, render_summary(cycle)).map_err(wrap)?;
        Ok(path)
    }
}

/// Human-readable summary of one cycle.
pub fn render_summary(cycle: &UpdateCycle) -> String {
    let written: Vec<&Path> = cycle.updated_paths().collect();
    let failed: Vec<_> = cycle.failures().collect();
    let unstaged: Vec<_> = cycle.unstaged().collect();

    let mut out = String::new();
    let _ = writeln!(out, "Update Summary:");
    let _ = writeln!(out, "- Files processed: {}", cycle.updates.len());
    let _ = writeln!(out, "- Files added/updated: {}", written.len());
    let _ = writeln!(out, "- Files failed: {}", failed.len());
    if !unstaged.is_empty() {
        let _ = writeln!(out, "- Files not staged: {}", unstaged.len());
    }
    let _ = writeln!(out, "- Branch created: {}", cycle.branch_name);
    let _ = writeln!(out, "- Merge status: {}", cycle.merge.status_label());
    if let crate::vcs::MergeOutcome::ManualIntervention { reason } = &cycle.merge {
        let _ = writeln!(out, "  {}", reason.lines().next().unwrap_or_default());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Updated files:");
    for path in &written {
        let _ = writeln!(out, "- {}", path.display());
    }

    if !unstaged.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Written but not staged:");
        for file in unstaged {
            if let FileStatus::WrittenUnstaged { message, .. } = &file.status {
                let _ = writeln!(out, "- {}: {message}", file.relative_path.display());
            }
        }
    }

    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed files:");
        for file in failed {
            if let FileStatus::Failed { stage, message } = &file.status {
                let _ = writeln!(
                    out,
                    "- {} ({stage}): {message}",
                    file.relative_path.display()
                );
            }
        }
    }

    if !cycle.warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Parser warnings:");
        for warning in &cycle.warnings {
            let _ = writeln!(out, "- {warning}");
        }
    }

    out
}
