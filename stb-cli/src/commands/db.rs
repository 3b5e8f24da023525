//! `stb db create|upgrade|drop|reset`
//!
//! Every selected service is processed; a failing service is reported and
//! the next one is still attempted.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use stb_core::Service;
use stb_sync::{
    db::{self, ResetOutcome},
    Database, DbError, Postgres, SystemShell,
};

use super::load_fleet;

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Create databases and upgrade their migrations.
    Create(MigrateArgs),

    /// Upgrade database migrations.
    Upgrade(MigrateArgs),

    /// Drop databases.
    Drop(DropArgs),

    /// Drop databases, recreate them, then upgrade their migrations.
    Reset(ResetArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Service directories. Defaults to the current service, or every
    /// service below the current directory.
    pub paths: Vec<PathBuf>,

    /// Run migrations in parallel.
    #[arg(short = 'p', long)]
    pub parallel: bool,
}

#[derive(Args, Debug)]
pub struct DropArgs {
    /// Service directories. Defaults to the current service, or every
    /// service below the current directory.
    pub paths: Vec<PathBuf>,

    /// Drop even when other clients are connected. Use with caution.
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Service directories. Defaults to the current service, or every
    /// service below the current directory.
    pub paths: Vec<PathBuf>,

    /// Run migrations in parallel.
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Drop even when other clients are connected. Use with caution.
    #[arg(short = 'f', long)]
    pub force: bool,
}

enum Outcome {
    Done,
    Skipped(String),
}

pub fn run(cmd: DbCommand) -> Result<()> {
    let postgres = Postgres::new(SystemShell);
    match cmd {
        DbCommand::Create(args) => each_service(&args.paths, "created", |service| {
            postgres.create_databases(service, args.parallel).map(|()| Outcome::Done)
        }),
        DbCommand::Upgrade(args) => each_service(&args.paths, "upgraded", |service| {
            postgres.upgrade_databases(service, args.parallel).map(|()| Outcome::Done)
        }),
        DbCommand::Drop(args) => each_service(&args.paths, "dropped", |service| {
            postgres.drop_databases(service, args.force).map(|()| Outcome::Done)
        }),
        DbCommand::Reset(args) => each_service(&args.paths, "reset", |service| {
            match db::reset(&postgres, service, args.force, args.parallel)? {
                ResetOutcome::Reset => Ok(Outcome::Done),
                ResetOutcome::NotConfigured => {
                    Ok(Outcome::Skipped("database not configured".to_string()))
                }
            }
        }),
    }
}

fn each_service<F>(paths: &[PathBuf], verb: &str, mut op: F) -> Result<()>
where
    F: FnMut(&Service) -> Result<Outcome, DbError>,
{
    let fleet = load_fleet(paths)?;
    let mut failed = Vec::new();

    for service in &fleet {
        let name = service.name();
        match op(service) {
            Ok(Outcome::Done) => println!("{} {name} {verb}", "✓".green()),
            Ok(Outcome::Skipped(reason)) => println!("{} {name} skipped: {reason}", "~".yellow()),
            Err(err @ DbError::NotConfigured { .. }) => {
                tracing::warn!("{err}");
                println!("{} {name} skipped: {err}", "~".yellow());
            }
            Err(err) => {
                tracing::warn!("{name}: {err}");
                println!("{} {name} failed: {err}", "✗".red());
                failed.push(name.to_string());
            }
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    bail!("database command failed for: {}", failed.join(", "))
}
