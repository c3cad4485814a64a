//! End-to-end update cycles against throwaway git repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone};
use rstest::rstest;
use tempfile::TempDir;

use weaver_apply::test_support::{branches, commit_all, git, init_repo};
use weaver_apply::{
    ApplyError, CycleOutcome, Editor, FileStage, FileStatus, GitError, SkipReason,
    UpdateCoordinator,
};
use weaver_core::WeaverConfig;

#[derive(Clone, Default)]
struct RecordingEditor(Arc<Mutex<Vec<PathBuf>>>);

impl Editor for RecordingEditor {
    fn open(&self, project_root: &Path) {
        self.0.lock().unwrap().push(project_root.to_path_buf());
    }
}

struct Fixture {
    dir: TempDir,
    coordinator: UpdateCoordinator,
    editor: RecordingEditor,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let editor = RecordingEditor::default();
        let coordinator = UpdateCoordinator::with_editor(
            WeaverConfig::defaults_for(dir.path()),
            Box::new(editor.clone()),
        )
        .unwrap();
        Self {
            dir,
            coordinator,
            editor,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn doc(&self) -> PathBuf {
        self.root().join("weaver.md")
    }

    fn run(&mut self, text: &str) -> CycleOutcome {
        let doc = self.doc();
        fs::write(&doc, text).unwrap();
        self.coordinator.handle_at(&doc, now()).unwrap()
    }
}

fn now() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
}

fn completed(outcome: CycleOutcome) -> weaver_apply::UpdateCycle {
    match outcome {
        CycleOutcome::Completed(cycle) => cycle,
        CycleOutcome::Skipped(reason) => panic!("cycle skipped: {reason}"),
    }
}

#[test]
fn replaces_existing_file_with_backup_branch_and_log() {
    let mut fx = Fixture::new();
    fs::write(fx.root().join("x.md"), "old").unwrap();
    commit_all(fx.root(), "add x");

    let cycle = completed(fx.run("###FILE_START:x.md###\nnew\n###FILE_END:x.md###"));

    assert_eq!(fs::read_to_string(fx.root().join("x.md")).unwrap(), "new");
    assert_eq!(cycle.branch_name, "ai-update-20240309140507");
    assert!(cycle.merge_succeeded());
    assert!(branches(fx.root()).contains(&cycle.branch_name));

    let backup = fx.root().join(".weaver/backups/x-20240309140507.md");
    assert_eq!(fs::read_to_string(&backup).unwrap(), "old");
    assert_eq!(
        cycle.files[0].status,
        FileStatus::Written {
            created: false,
            backup: Some(backup),
        }
    );

    let log = fs::read_to_string(
        fx.root()
            .join(".weaver/logs/update_ai-update-20240309140507.log"),
    )
    .unwrap();
    assert!(log.contains("- Merge status: Automatic"));
    assert!(log.contains("Updated files:\n- x.md\n"));
}

#[test]
fn new_file_is_created_without_backup_and_merged() {
    let mut fx = Fixture::new();

    let cycle = completed(fx.run(
        "###FILE_START:src/new/mod.rs###\npub fn f() {}\n###FILE_END:src/new/mod.rs###",
    ));

    assert_eq!(
        cycle.files[0].status,
        FileStatus::Written {
            created: true,
            backup: None,
        }
    );
    assert_eq!(
        git(fx.root(), &["show", "main:src/new/mod.rs"]),
        "pub fn f() {}"
    );
    assert_eq!(
        git(fx.root(), &["rev-parse", "--abbrev-ref", "HEAD"]).trim(),
        "main"
    );
}

#[test]
fn conflict_writes_everything_and_opens_editor() {
    let mut fx = Fixture::new();
    // Work on a branch that diverges from main on README.md.
    git(fx.root(), &["checkout", "-q", "-b", "work"]);
    git(fx.root(), &["checkout", "-q", "main"]);
    fs::write(fx.root().join("README.md"), "main side\n").unwrap();
    commit_all(fx.root(), "main edit");
    git(fx.root(), &["checkout", "-q", "work"]);

    let cycle = completed(fx.run(
        "###FILE_START:README.md###\nupdate side\n###FILE_END:README.md###\n\
         ###FILE_START:extra.txt###\nextra\n###FILE_END:extra.txt###",
    ));

    assert!(!cycle.merge_succeeded());
    assert_eq!(cycle.updated_paths().count(), 2);
    assert_eq!(
        fs::read_to_string(fx.root().join("extra.txt")).unwrap(),
        "extra"
    );
    assert_eq!(*fx.editor.0.lock().unwrap(), vec![fx.root().to_path_buf()]);

    let log = fs::read_to_string(fx.coordinator.config().logs_folder.join(format!(
        "update_{}.log",
        cycle.branch_name
    )))
    .unwrap();
    assert!(log.contains("- Merge status: Manual intervention required"));
}

#[test]
fn unresolved_conflict_blocks_the_next_cycle() {
    let mut fx = Fixture::new();
    git(fx.root(), &["checkout", "-q", "-b", "work"]);
    git(fx.root(), &["checkout", "-q", "main"]);
    fs::write(fx.root().join("README.md"), "main side\n").unwrap();
    commit_all(fx.root(), "main edit");
    git(fx.root(), &["checkout", "-q", "work"]);

    let first = completed(fx.run(
        "###FILE_START:README.md###\nupdate side\n###FILE_END:README.md###",
    ));
    assert!(!first.merge_succeeded());
    let branches_after_conflict = branches(fx.root());

    let doc = fx.doc();
    let directives = "###FILE_START:other.txt###\nother\n###FILE_END:other.txt###";
    fs::write(&doc, directives).unwrap();
    let later = Local.with_ymd_and_hms(2024, 3, 9, 14, 6, 0).unwrap();
    let err = fx.coordinator.handle_at(&doc, later).unwrap_err();

    assert!(
        matches!(
            err,
            ApplyError::BranchCreationFailed {
                source: GitError::MergeInProgress { .. },
                ..
            }
        ),
        "got: {err}"
    );
    assert_eq!(fs::read_to_string(&doc).unwrap(), directives);
    assert!(!fx.root().join("other.txt").exists());
    assert_eq!(branches(fx.root()), branches_after_conflict);
    assert_eq!(
        git(fx.root(), &["rev-parse", "--abbrev-ref", "HEAD"]).trim(),
        "main"
    );
    assert_eq!(fx.editor.0.lock().unwrap().len(), 1);

    // Once resolved, cycles run again.
    git(fx.root(), &["merge", "--abort"]);
    let retried = completed(fx.coordinator.handle_at(&doc, later).unwrap());
    assert!(retried.merge_succeeded());
    assert_eq!(
        fs::read_to_string(fx.root().join("other.txt")).unwrap(),
        "other"
    );
}

#[rstest]
#[case::empty("")]
#[case::whitespace("   \n\t\n")]
fn blank_document_is_skipped(#[case] text: &str) {
    let mut fx = Fixture::new();

    let outcome = fx.run(text);

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::EmptyDocument)
    ));
    assert_eq!(branches(fx.root()), vec!["main"]);
}

#[test]
fn document_is_cleared_after_cycle() {
    let mut fx = Fixture::new();

    let cycle = completed(fx.run("###FILE_START:a.txt###\na\n###FILE_END:a.txt###"));

    assert!(cycle.document_cleared);
    assert_eq!(fs::read_to_string(fx.doc()).unwrap(), "");
    // The clearing write triggers another event; it must be a no-op.
    let again = fx.coordinator.handle_at(&fx.doc(), now()).unwrap();
    assert!(matches!(
        again,
        CycleOutcome::Skipped(SkipReason::EmptyDocument)
    ));
}

#[test]
fn write_failure_does_not_stop_later_updates() {
    let mut fx = Fixture::new();
    // A regular file where a parent directory is needed.
    fs::write(fx.root().join("blocker"), "file").unwrap();
    commit_all(fx.root(), "blocker");

    let cycle = completed(fx.run(
        "###FILE_START:blocker/inner.txt###\nx\n###FILE_END:blocker/inner.txt###\n\
         ###FILE_START:ok.txt###\nok\n###FILE_END:ok.txt###",
    ));

    assert!(matches!(
        cycle.files[0].status,
        FileStatus::Failed {
            stage: FileStage::Write,
            ..
        }
    ));
    assert_eq!(fs::read_to_string(fx.root().join("ok.txt")).unwrap(), "ok");
    assert_eq!(
        cycle.updated_paths().collect::<Vec<_>>(),
        vec![Path::new("ok.txt")]
    );
    assert!(cycle.merge_succeeded());
}

#[test]
fn ignored_file_is_written_but_reported_unstaged() {
    let mut fx = Fixture::new();
    fs::write(fx.root().join(".gitignore"), "secret.txt\n").unwrap();
    commit_all(fx.root(), "ignore secret");

    let cycle = completed(fx.run(
        "###FILE_START:secret.txt###\nhidden\n###FILE_END:secret.txt###\n\
         ###FILE_START:ok.txt###\nok\n###FILE_END:ok.txt###",
    ));

    assert_eq!(
        fs::read_to_string(fx.root().join("secret.txt")).unwrap(),
        "hidden"
    );
    assert!(matches!(
        &cycle.files[0].status,
        FileStatus::WrittenUnstaged { created: true, backup: None, .. }
    ));
    assert_eq!(
        cycle.updated_paths().collect::<Vec<_>>(),
        vec![Path::new("secret.txt"), Path::new("ok.txt")]
    );
    assert_eq!(cycle.failures().count(), 0);
    assert_eq!(cycle.unstaged().count(), 1);
    assert!(cycle.merge_succeeded());

    let on_main = git(fx.root(), &["ls-tree", "--name-only", "main"]);
    assert!(on_main.lines().any(|l| l == "ok.txt"));
    assert!(!on_main.lines().any(|l| l == "secret.txt"));

    let log = fs::read_to_string(
        fx.coordinator
            .config()
            .logs_folder
            .join(format!("update_{}.log", cycle.branch_name)),
    )
    .unwrap();
    assert!(log.contains("Written but not staged:\n- secret.txt: "));
    assert!(!log.contains("Failed files:"));
}

#[test]
fn directives_targeting_the_document_are_ignored() {
    let mut fx = Fixture::new();

    let cycle = completed(fx.run(
        "###FILE_START:weaver.md###\nloop\n###FILE_END:weaver.md###\n\
         ###FILE_START:a.txt###\na\n###FILE_END:a.txt###",
    ));

    assert_eq!(cycle.updates.len(), 1);
    assert_eq!(cycle.warnings.len(), 1);
    assert_eq!(fs::read_to_string(fx.doc()).unwrap(), "");
}

#[test]
fn outside_repository_cannot_build_coordinator() {
    let dir = TempDir::new().unwrap();
    let result = UpdateCoordinator::new(WeaverConfig::defaults_for(dir.path()));
    assert!(result.is_err());
}
