pub mod config;
pub mod db;
pub mod run;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use stb_core::{config as stb_config, discovery, EnvOverrides, Fleet};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// The fleet for `paths`, or the default set when none are given.
pub(crate) fn load_fleet(paths: &[PathBuf]) -> Result<Fleet> {
    let fleet = discovery::gather_services(paths).context("failed to discover services")?;
    if fleet.is_empty() {
        tracing::warn!("no services found; pass service paths or run inside a service");
    }
    Ok(fleet)
}

/// Override variables from `~/.stb/config.yaml` and the process environment.
pub(crate) fn load_overrides(home: &Path) -> Result<EnvOverrides> {
    let config = stb_config::load_at(home).context("failed to load ~/.stb/config.yaml")?;
    Ok(EnvOverrides::from_config_and_process(&config))
}
