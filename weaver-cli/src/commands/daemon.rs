//! `weaver daemon` — background watcher lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;

use weaver_core::config;
use weaver_daemon::paths::{process_log_path, socket_path};
use weaver_daemon::{request_apply, request_status, request_stop, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the watcher in the foreground.
    Start,
    /// Request graceful shutdown over the Unix socket.
    Stop,
    /// Query runtime status over the Unix socket.
    Status(DaemonStatusArgs),
    /// Ask the running daemon to apply the monitored file now.
    Apply,
    /// Print recent lines of the process log.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStatusArgs {
    /// Print a human-readable summary instead of JSON.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            let (config, created) = config::load_or_init().context("failed to load weaver config")?;
            if created {
                println!(
                    "Created {}",
                    config::config_path_at(&config.project_root).display()
                );
            }
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => {
            let config = config::load().context("failed to load weaver config")?;
            match request_stop(&config.project_root) {
                Ok(()) => println!("daemon stop requested"),
                Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
                Err(err) => return Err(err).context("failed to stop daemon"),
            }
        }
        DaemonCommand::Status(args) => {
            let config = config::load().context("failed to load weaver config")?;
            let status = match request_status(&config.project_root) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&config.project_root).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            if args.pretty {
                print_status(&status);
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
        }
        DaemonCommand::Apply => {
            let config = config::load().context("failed to load weaver config")?;
            let summary = request_apply(&config.project_root).context("daemon apply failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render cycle summary JSON")?
            );
        }
        DaemonCommand::Logs(args) => {
            let config = config::load().context("failed to load weaver config")?;
            print_tail(&process_log_path(&config.logs_folder), args.lines)
                .context("failed to read process log")?;
        }
    }

    Ok(())
}

fn print_status(status: &Value) {
    if !status["running"].as_bool().unwrap_or(false) {
        println!("{} daemon is not running", "●".red());
        return;
    }

    let started = status["started_at_unix"]
        .as_i64()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let cycles = &status["cycles"];

    println!(
        "{} daemon running (pid {})",
        "●".green(),
        status["pid"].as_u64().unwrap_or_default()
    );
    println!("  started:   {started}");
    println!("  watching:  {}", status["monitored_file"].as_str().unwrap_or("-"));
    println!(
        "  cycles:    {} completed, {} skipped, {} failed",
        cycles["completed"].as_u64().unwrap_or_default(),
        cycles["skipped"].as_u64().unwrap_or_default(),
        cycles["failed"].as_u64().unwrap_or_default(),
    );
    if let Some(branch) = cycles["last_branch"].as_str() {
        println!(
            "  last:      {branch} ({})",
            cycles["last_merge_status"].as_str().unwrap_or("-")
        );
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line);
        }
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
