//! Builds the ordered [`Fleet`] for one invocation.
//!
//! # Default set
//!
//! When no paths are given, the working directory is used if it is itself a
//! service checkout; otherwise every immediate subdirectory that is a
//! service, sorted by directory name. A directory counts as a service when
//! it contains `.env`, `.env.example` or `.git`.
//!
//! Like the config module, every entry point has an `_at(cwd, …)` form used
//! by tests and a wrapper that reads the process working directory.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::dotenv::DotEnv;
use crate::error::{io_err, DiscoveryError};
use crate::manifest::Manifest;
use crate::types::{Fleet, Service, DOTENV_EXAMPLE_FILE, DOTENV_FILE};

const SERVICE_MARKERS: &[&str] = &[DOTENV_FILE, DOTENV_EXAMPLE_FILE, ".git"];

/// Whether `dir` looks like a service checkout.
pub fn is_service_dir(dir: &Path) -> bool {
    dir.is_dir() && SERVICE_MARKERS.iter().any(|m| dir.join(m).exists())
}

/// Read one service: `.env`, `.env.example` and the optional manifest.
///
/// Missing env files read as empty; `.env` is created on first save.
pub fn load_service(dir: &Path) -> Result<Service, DiscoveryError> {
    let dir = dir
        .canonicalize()
        .map_err(|_| DiscoveryError::ServiceNotFound {
            path: dir.to_path_buf(),
        })?;
    if !dir.is_dir() {
        return Err(DiscoveryError::ServiceNotFound { path: dir });
    }

    let dotenv = read_dotenv_or_empty(&dir.join(DOTENV_FILE))?;
    let dotenv_example = read_dotenv_or_empty(&dir.join(DOTENV_EXAMPLE_FILE))?;
    let yaml_config = Manifest::load_from_dir(&dir)?;

    Ok(Service {
        dir,
        dotenv,
        dotenv_example,
        yaml_config,
    })
}

/// Paths making up the default set when the user names none.
pub fn default_service_paths_at(cwd: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    if is_service_dir(cwd) {
        return Ok(vec![cwd.to_path_buf()]);
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(cwd)
        .map_err(|e| io_err(cwd, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_service_dir(p))
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Gather the fleet for `paths` (relative paths resolve against `cwd`),
/// or the default set when `paths` is empty. Order follows `paths`.
///
/// A directory given more than once is loaded once, at its first position.
/// Two different directories with the same name are still a
/// [`DiscoveryError::DuplicateService`].
pub fn gather_services_at(cwd: &Path, paths: &[PathBuf]) -> Result<Fleet, DiscoveryError> {
    let paths = if paths.is_empty() {
        default_service_paths_at(cwd)?
    } else {
        let mut seen = HashSet::new();
        paths
            .iter()
            .map(|p| cwd.join(p))
            .filter(|p| seen.insert(std::fs::canonicalize(p).unwrap_or_else(|_| p.clone())))
            .collect()
    };

    let services = paths
        .iter()
        .map(|p| load_service(p))
        .collect::<Result<Vec<_>, _>>()?;
    Fleet::new(services)
}

/// `gather_services_at` convenience wrapper using the process working directory.
pub fn gather_services(paths: &[PathBuf]) -> Result<Fleet, DiscoveryError> {
    let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
    gather_services_at(&cwd, paths)
}

fn read_dotenv_or_empty(path: &Path) -> Result<DotEnv, DiscoveryError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(DotEnv::parse(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(DotEnv::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
