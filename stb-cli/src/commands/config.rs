//! `stb config show|set|unset`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use stb_core::config as stb_config;

use super::home_dir;

/// Manage override variables used for empty template defaults.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the configuration file.
    Show,

    /// Set an override variable.
    Set(SetArgs),

    /// Remove an override variable.
    Unset(UnsetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Env var name, e.g. `SENTRY_DSN`.
    pub key: String,
    pub value: String,
}

#[derive(Args, Debug)]
pub struct UnsetArgs {
    pub key: String,
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    let home = home_dir()?;
    match cmd {
        ConfigCommand::Show => {
            let config = stb_config::load_at(&home).context("failed to load config")?;
            println!("# {}", stb_config::config_path_at(&home).display());
            if config.env_vars.is_empty() {
                println!("No override variables set.");
                return Ok(());
            }
            for (key, value) in &config.env_vars {
                println!("{key}={value}");
            }
            Ok(())
        }
        ConfigCommand::Set(args) => {
            stb_config::set_env_var_at(&home, &args.key, &args.value)
                .with_context(|| format!("failed to set '{}'", args.key))?;
            println!("{} {} set", "✓".green(), args.key);
            Ok(())
        }
        ConfigCommand::Unset(args) => {
            let removed = stb_config::unset_env_var_at(&home, &args.key)
                .with_context(|| format!("failed to unset '{}'", args.key))?;
            match removed {
                Some(_) => println!("{} {} removed", "✓".green(), args.key),
                None => println!("{} {} was not set", "~".yellow(), args.key),
            }
            Ok(())
        }
    }
}
