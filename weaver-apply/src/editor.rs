//! Hand-off to an external merge-resolution tool.

use std::path::Path;
use std::process::{Command, Stdio};

/// Something that can be pointed at the project root when a merge needs a
/// human. Fire-and-forget: no result is consumed.
pub trait Editor: Send {
    fn open(&self, project_root: &Path);
}

/// Launches `command[0] command[1..] <project_root>` in the background.
#[derive(Debug, Clone, Default)]
pub struct CommandEditor {
    command: Vec<String>,
}

impl CommandEditor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Editor for CommandEditor {
    fn open(&self, project_root: &Path) {
        let Some((program, args)) = self.command.split_first() else {
            tracing::debug!("no editor command configured; skipping hand-off");
            return;
        };

        let spawned = Command::new(program)
            .args(args)
            .arg(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                tracing::info!(
                    program = %program,
                    pid = child.id(),
                    root = %project_root.display(),
                    "opened editor for merge resolution",
                );
                // Reap the child so it does not linger as a zombie.
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(err) => tracing::warn!(
                program = %program,
                error = %err,
                "failed to launch editor for merge resolution",
            ),
        }
    }
}
