//! # stb-sync
//!
//! Fleet synchronization engine: env reconciliation, fleet-wide port
//! allocation, the per-service update workflow and the collaborators it
//! drives (shell, Postgres).
//!
//! Call [`pipeline::refresh_env`] or [`pipeline::refresh_ports`] for the
//! file-only refreshes, or [`Updater::update_fleet`] for the full workflow.

pub mod db;
pub mod diff;
pub mod env;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod runner;
pub mod shell;
pub mod update;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

pub use db::{Database, DbError, Postgres};
pub use error::SyncError;
pub use ports::{allocate_and_rewire, PortPlan};
pub use runner::{Runner, RunnerKind};
pub use shell::{Shell, ShellCommand, ShellError, SystemShell, WorkdirScope};
pub use update::{FailurePolicy, ServiceOutcome, UpdateOptions, UpdateReport, Updater};
pub use writer::{save_dotenv, WriteResult};
