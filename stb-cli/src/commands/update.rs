//! `stb update env|ports|package`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use stb_sync::{
    pipeline::{self, ServiceWrite},
    update::Step,
    FailurePolicy, Postgres, ServiceOutcome, SystemShell, UpdateOptions, UpdateReport, Updater,
    WriteResult,
};

use super::{home_dir, load_fleet, load_overrides};

#[derive(Subcommand, Debug)]
pub enum UpdateCommand {
    /// Add fields missing from `.env` using `.env.example` and override variables.
    Env(RefreshArgs),

    /// Assign local ports across the services and rewire their `_URL` fields.
    Ports(RefreshArgs),

    /// Update source code and dependencies of the services.
    Package(PackageArgs),
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Service directories. Defaults to the current service, or every
    /// service below the current directory.
    pub paths: Vec<PathBuf>,

    /// Show the changes without writing any files.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Service directories. Defaults to the current service, or every
    /// service below the current directory.
    pub paths: Vec<PathBuf>,

    /// Run `poetry update` instead of `poetry install`.
    #[arg(short = 'u', long = "update")]
    pub update_dependencies: bool,

    /// Pull the latest changes.
    #[arg(short = 'p', long = "pull")]
    pub pull_changes: bool,

    /// Reassign ports across the services.
    #[arg(short = 'P', long = "ports")]
    pub update_ports: bool,

    /// Fill missing `.env` fields.
    #[arg(short = 'e', long = "env")]
    pub update_env: bool,

    /// Stash local changes and check out master.
    #[arg(short = 'c', long = "checkout")]
    pub checkout_to_master: bool,

    /// Drop and recreate the databases of each service.
    #[arg(short = 'd', long = "reset-databases")]
    pub reset_databases: bool,

    /// Keep updating the remaining services after one fails.
    #[arg(long)]
    pub keep_going: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: UpdateCommand) -> Result<()> {
    match cmd {
        UpdateCommand::Env(args) => {
            let home = home_dir()?;
            let overrides = load_overrides(&home)?;
            let mut fleet = load_fleet(&args.paths)?;
            let writes = pipeline::refresh_env(&mut fleet, &overrides, args.dry_run)
                .context("env update failed")?;
            print_writes(&writes, args.dry_run);
            Ok(())
        }
        UpdateCommand::Ports(args) => {
            let mut fleet = load_fleet(&args.paths)?;
            let writes =
                pipeline::refresh_ports(&mut fleet, args.dry_run).context("port update failed")?;
            print_writes(&writes, args.dry_run);
            Ok(())
        }
        UpdateCommand::Package(args) => args.run(),
    }
}

impl PackageArgs {
    fn options(&self) -> UpdateOptions {
        UpdateOptions {
            update_dependencies: self.update_dependencies,
            pull_changes: self.pull_changes,
            update_ports: self.update_ports,
            update_env: self.update_env,
            checkout_to_master: self.checkout_to_master,
            reset_databases: self.reset_databases,
        }
    }

    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let overrides = load_overrides(&home)?;
        let mut fleet = load_fleet(&self.paths)?;

        let shell = SystemShell;
        let db = Postgres::new(SystemShell);
        let policy = if self.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        };
        let report = Updater::new(&shell, &db, &overrides)
            .options(self.options())
            .policy(policy)
            .update_fleet(&mut fleet)
            .context("package update failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
        } else {
            print_report(&report);
        }
        fail_on_errors(&report)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_writes(writes: &[ServiceWrite], dry_run: bool) {
    if writes.is_empty() {
        println!("No services found.");
        return;
    }

    let prefix = if dry_run { "[dry-run] " } else { "" };
    for write in writes {
        let path = write.result.path().display();
        match &write.result {
            WriteResult::Written { .. } => {
                println!("{prefix}{} {} {path}", "✓".green(), write.service)
            }
            WriteResult::WouldWrite { .. } => {
                println!("{prefix}{} {} {path}", "~".yellow(), write.service)
            }
            WriteResult::Unchanged { .. } => {
                println!("{prefix}{} {} unchanged", "·".bright_black(), write.service)
            }
        }
        if let Some(diff) = &write.diff {
            print!("{}", diff.unified_diff);
        }
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_report(report: &UpdateReport) {
    if report.services.is_empty() {
        println!("No services found.");
        return;
    }

    let rows: Vec<ReportRow> = report
        .services
        .iter()
        .map(|service| {
            let (status, detail) = match &service.outcome {
                ServiceOutcome::Updated { skipped } => (
                    format!("{} updated", "✓".green()),
                    skipped_detail(skipped),
                ),
                ServiceOutcome::Failed { step, message, .. } => (
                    format!("{} failed", "✗".red()),
                    format!("{step}: {message}"),
                ),
                ServiceOutcome::NotRun => (format!("{} not run", "~".yellow()), String::new()),
            };
            ReportRow {
                service: service.service.to_string(),
                status,
                detail,
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let elapsed = report.finished_at - report.started_at;
    println!("Finished in {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
    if let Some(summary) = report.stash_summary() {
        println!("{summary}");
    }
}

fn skipped_detail(skipped: &[Step]) -> String {
    skipped
        .iter()
        .map(|step| match step {
            Step::Databases => "databases not configured".to_string(),
            other => format!("{other} skipped"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn fail_on_errors(report: &UpdateReport) -> Result<()> {
    let failed: Vec<String> = report
        .failures()
        .map(|service| service.service.to_string())
        .collect();
    if failed.is_empty() {
        return Ok(());
    }
    bail!("update failed for: {}", failed.join(", "))
}
