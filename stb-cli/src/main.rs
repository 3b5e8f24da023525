//! stb: keep a local fleet of microservice checkouts in sync.
//!
//! # Usage
//!
//! ```text
//! stb update env [PATHS..] [--dry-run]
//! stb update ports [PATHS..] [--dry-run]
//! stb update package [PATHS..] [-u] [-p] [-P] [-e] [-c] [-d] [--keep-going] [--json]
//! stb db create|upgrade [PATHS..] [-p]
//! stb db drop [PATHS..] [-f]
//! stb db reset [PATHS..] [-p] [-f]
//! stb run <SERVICES..>
//! stb config show|set <KEY> <VALUE>|unset <KEY>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, db::DbCommand, run::RunArgs, update::UpdateCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stb",
    version,
    about = "Keep env files, ports and checkouts of local microservices in sync",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update env files, ports or packages of the selected services.
    Update {
        #[command(subcommand)]
        command: UpdateCommand,
    },

    /// Create, upgrade, drop or reset the local databases of services.
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },

    /// Check out and run the selected services together.
    Run(RunArgs),

    /// Show or edit the override variables in ~/.stb/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Update { command } => commands::update::run(command),
        Commands::Db { command } => commands::db::run(command),
        Commands::Run(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
