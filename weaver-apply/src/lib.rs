//! # weaver-apply
//!
//! Directive application pipeline: backup, write, stage, merge, report.
//!
//! Build an [`UpdateCoordinator`] from a [`weaver_core::WeaverConfig`] and call
//! [`UpdateCoordinator::handle`] once per change of the instruction document.

pub mod backup;
pub mod coordinator;
pub mod editor;
pub mod error;
pub mod git;
pub mod report;
pub mod vcs;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use backup::BackupStore;
pub use coordinator::{
    CycleOutcome, FileOutcome, FileStage, FileStatus, SkipReason, UpdateCoordinator, UpdateCycle,
};
pub use editor::{CommandEditor, Editor};
pub use error::{ApplyError, GitError};
pub use report::OutcomeReporter;
pub use vcs::{MergeOutcome, SessionState, VersionControlSession};
pub use writer::{write_file, WriteResult};
