//! weaver: apply file directives from an instruction document to a git repo.
//!
//! # Usage
//!
//! ```text
//! weaver init
//! weaver apply [--document <path>]
//! weaver parse [<path>] [--json]
//! weaver daemon start|stop|status|apply|logs
//! ```
//!
//! Every command works on the project rooted at the current directory and its
//! `.weaver/config.json`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{apply::ApplyArgs, daemon::DaemonCommand, init::InitArgs, parse::ParseArgs};

#[derive(Parser, Debug)]
#[command(
    name = "weaver",
    version,
    about = "Apply file directives from an instruction document on a fresh git branch",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default .weaver/config.json for the current directory.
    Init(InitArgs),

    /// Run one update cycle on the instruction document now.
    Apply(ApplyArgs),

    /// Preview the directives in a document without touching anything.
    Parse(ParseArgs),

    /// Manage the background watcher.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Apply(args) => args.run(),
        Commands::Parse(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
