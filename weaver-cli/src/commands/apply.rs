//! `weaver apply` — one synchronous update cycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use weaver_apply::{CycleOutcome, FileStatus, UpdateCoordinator, UpdateCycle};
use weaver_core::config;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Instruction document to apply (defaults to the configured monitored file).
    #[arg(long, short = 'd')]
    pub document: Option<PathBuf>,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let (config, _) = config::load_or_init().context("failed to load weaver config")?;
        weaver_daemon::logging::init(&config.logs_folder)
            .context("failed to initialize logging")?;

        let document = self
            .document
            .map(|p| config.project_root.join(p))
            .unwrap_or_else(|| config.monitored_file.clone());

        let mut coordinator = UpdateCoordinator::new(config)
            .context("cannot open the project repository")?;
        let outcome = coordinator
            .handle(&document)
            .with_context(|| format!("update cycle failed for {}", document.display()))?;

        match outcome {
            CycleOutcome::Skipped(reason) => {
                println!("{} Nothing to apply: {reason}", "·".dimmed());
            }
            CycleOutcome::Completed(cycle) => print_cycle(&cycle),
        }
        Ok(())
    }
}

fn print_cycle(cycle: &UpdateCycle) {
    let written = cycle.updated_paths().count();
    let failed = cycle.failures().count();

    println!(
        "{} Applied {written} of {} file(s) on branch {}",
        if failed == 0 { "✓".green() } else { "!".yellow() },
        cycle.updates.len(),
        cycle.branch_name.bold(),
    );

    for file in &cycle.files {
        match &file.status {
            FileStatus::Written { created: true, .. } => {
                println!("  +  {}", file.relative_path.display())
            }
            FileStatus::Written { created: false, .. } => {
                println!("  ✎  {}", file.relative_path.display())
            }
            FileStatus::WrittenUnstaged { message, .. } => println!(
                "  {}  {} (written, not staged: {message})",
                "!".yellow(),
                file.relative_path.display()
            ),
            FileStatus::Failed { stage, message } => println!(
                "  {}  {} ({stage}: {message})",
                "✗".red(),
                file.relative_path.display()
            ),
        }
    }

    if cycle.merge_succeeded() {
        println!("Merge status: {}", cycle.merge.status_label().green());
    } else {
        println!("Merge status: {}", cycle.merge.status_label().red());
    }
    if !cycle.document_cleared {
        println!("{} instruction document could not be cleared", "!".yellow());
    }
}
