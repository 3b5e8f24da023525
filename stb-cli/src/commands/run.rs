//! `stb run <SERVICES..>`: check out and start services together.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use stb_sync::{Postgres, Runner, SystemShell};

use super::{home_dir, load_fleet, load_overrides};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Service directories to check out and run at the same time.
    #[arg(required = true)]
    pub services: Vec<PathBuf>,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let overrides = load_overrides(&home)?;
        let mut fleet = load_fleet(&self.services)?;
        let launch_dir = std::env::current_dir().context("could not read current directory")?;

        let runner = Runner::detect();
        if let Some(note) = runner.launch_note(fleet.len()) {
            println!("{} {note}", "~".yellow());
        }

        println!("Checking out services...");
        let shell = SystemShell;
        let db = Postgres::new(SystemShell);
        let report = runner
            .run(&shell, &db, &overrides, &mut fleet, &launch_dir)
            .context("failed to run services")?;

        if let Some(summary) = report.stash_summary() {
            println!("{summary}");
        }
        let failed: Vec<String> = report
            .failures()
            .map(|service| service.service.to_string())
            .collect();
        if !failed.is_empty() {
            bail!("could not prepare: {}", failed.join(", "));
        }
        Ok(())
    }
}
