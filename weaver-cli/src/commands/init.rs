//! `weaver init`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use weaver_core::config;

#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let (config, created) = config::load_or_init().context("failed to initialize weaver")?;
        let path = config::config_path_at(&config.project_root);

        if created {
            println!("{} Created {}", "✓".green(), path.display());
        } else {
            println!("{} Using existing {}", "·".dimmed(), path.display());
        }
        println!("  monitored file: {}", config.monitored_file.display());
        println!("  primary branch: {}", config.primary_branch);
        println!("  backups:        {}", config.backups_folder.display());
        println!("  logs:           {}", config.logs_folder.display());
        Ok(())
    }
}
