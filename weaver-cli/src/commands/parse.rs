//! `weaver parse` — side-effect-free preview of a document's directives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use weaver_core::{config, ParsedDocument};

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Document to parse (defaults to the configured monitored file).
    pub path: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct DirectiveRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "lines")]
    lines: usize,
    #[tabled(rename = "bytes")]
    bytes: usize,
}

#[derive(Serialize)]
struct ParseJson {
    updates: Vec<UpdateJson>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct UpdateJson {
    path: String,
    lines: usize,
    bytes: usize,
}

impl ParseArgs {
    pub fn run(self) -> Result<()> {
        let config = config::load().context("failed to load weaver config")?;
        let path = self
            .path
            .map(|p| config.project_root.join(p))
            .unwrap_or_else(|| config.monitored_file.clone());
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let parsed = config.directive_parser(&path).parse(&text);

        if self.json {
            print_json(&parsed)
        } else {
            print_table(&parsed);
            Ok(())
        }
    }
}

fn print_table(parsed: &ParsedDocument) {
    if parsed.updates.is_empty() {
        println!("No directives found.");
    } else {
        let rows = parsed
            .updates
            .iter()
            .enumerate()
            .map(|(i, update)| DirectiveRow {
                index: i + 1,
                path: update.relative_path().display().to_string(),
                lines: update.content().lines().count(),
                bytes: update.content().len(),
            });
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for warning in &parsed.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
}

fn print_json(parsed: &ParsedDocument) -> Result<()> {
    let payload = ParseJson {
        updates: parsed
            .updates
            .iter()
            .map(|update| UpdateJson {
                path: update.relative_path().display().to_string(),
                lines: update.content().lines().count(),
                bytes: update.content().len(),
            })
            .collect(),
        warnings: parsed.warnings.iter().map(ToString::to_string).collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render JSON")?
    );
    Ok(())
}
