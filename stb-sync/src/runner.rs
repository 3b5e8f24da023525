//! Check out and start a selection of services together.
//!
//! When `concurrently` is on `PATH` all services are started by one
//! fan-out invocation. Otherwise each service runs in the foreground, and
//! the next one only starts after the previous one exits.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use stb_core::{EnvOverrides, Fleet};

use crate::db::Database;
use crate::shell::{Shell, ShellCommand, WorkdirScope};
use crate::update::{UpdateOptions, UpdateReport, Updater};
use crate::SyncError;

pub const FAN_OUT_PROGRAM: &str = "concurrently";
const START_COMMAND: &str = "make run || poetry run python3 run.py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    /// One service at a time, each in the foreground.
    Sequential,
    /// All services under a single `concurrently` process.
    FanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runner {
    kind: RunnerKind,
}

impl Runner {
    pub fn new(kind: RunnerKind) -> Self {
        Self { kind }
    }

    /// Pick the runner from the process `PATH`.
    pub fn detect() -> Self {
        Self::detect_in(std::env::var_os("PATH").as_deref())
    }

    /// Pick the runner from an explicit search path.
    pub fn detect_in(path: Option<&OsStr>) -> Self {
        let found = path
            .map(|path| {
                std::env::split_paths(path).any(|dir| is_executable(&dir.join(FAN_OUT_PROGRAM)))
            })
            .unwrap_or(false);
        let kind = if found {
            RunnerKind::FanOut
        } else {
            RunnerKind::Sequential
        };
        tracing::debug!("runner: {kind:?}");
        Self { kind }
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    /// Warning to show before starting `services` services that will not
    /// run side by side.
    pub fn launch_note(&self, services: usize) -> Option<String> {
        (self.kind == RunnerKind::Sequential && services > 1).then(|| {
            format!(
                "`{FAN_OUT_PROGRAM}` not found: the {services} services start one at a time \
                 and each waits for the previous one to exit"
            )
        })
    }

    /// Commands that start the fleet, each with the directory it runs in.
    pub fn launch_commands(
        &self,
        fleet: &Fleet,
        launch_dir: &Path,
    ) -> Vec<(PathBuf, ShellCommand)> {
        match self.kind {
            RunnerKind::FanOut => {
                if fleet.is_empty() {
                    return Vec::new();
                }
                let command = ShellCommand::new(FAN_OUT_PROGRAM)
                    .args(fleet.iter().map(|service| {
                        format!("cd {} && ({START_COMMAND})", sh_quote(&service.dir))
                    }))
                    .interactive();
                vec![(launch_dir.to_path_buf(), command)]
            }
            RunnerKind::Sequential => fleet
                .iter()
                .map(|service| {
                    let command = ShellCommand::new("sh")
                        .args(["-c", START_COMMAND])
                        .interactive();
                    (service.dir.clone(), command)
                })
                .collect(),
        }
    }

    /// Stash, check out `master`, pull and reset the databases of every
    /// service, then start them all.
    ///
    /// Nothing is started when any service failed to update.
    pub fn run<S, D>(
        &self,
        shell: &S,
        db: &D,
        overrides: &EnvOverrides,
        fleet: &mut Fleet,
        launch_dir: &Path,
    ) -> Result<UpdateReport, SyncError>
    where
        S: Shell + ?Sized,
        D: Database + ?Sized,
    {
        let options = UpdateOptions {
            checkout_to_master: true,
            pull_changes: true,
            reset_databases: true,
            ..UpdateOptions::default()
        };
        let report = Updater::new(shell, db, overrides)
            .options(options)
            .update_fleet(fleet)?;
        if !report.is_success() {
            tracing::warn!("not starting services: update failed");
            return Ok(report);
        }

        for (dir, command) in self.launch_commands(fleet, launch_dir) {
            let scope = WorkdirScope::enter(shell, &dir)?;
            scope.run(&command)?;
        }
        Ok(report)
    }
}

fn sh_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-".contains(c))
    {
        return raw.into_owned();
    }
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("cmd").is_file()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
