//! Fleet-wide env and port refreshes shared by the `update env` and
//! `update ports` commands.

use stb_core::{EnvOverrides, Fleet, Service, ServiceName};

use crate::diff::{diff_dotenv, EnvDiff};
use crate::writer::{save_dotenv, WriteResult};
use crate::{env, ports, SyncError};

/// What happened to one service's `.env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceWrite {
    pub service: ServiceName,
    pub result: WriteResult,
    /// Only computed in dry-run mode.
    pub diff: Option<EnvDiff>,
}

/// Fill missing env fields of every service from its template and persist.
pub fn refresh_env(
    fleet: &mut Fleet,
    overrides: &EnvOverrides,
    dry_run: bool,
) -> Result<Vec<ServiceWrite>, SyncError> {
    env::reconcile_fleet(fleet, overrides);
    persist_all(fleet, dry_run)
}

/// Allocate ports across the whole fleet, rewire `_URL` fields and persist.
pub fn refresh_ports(fleet: &mut Fleet, dry_run: bool) -> Result<Vec<ServiceWrite>, SyncError> {
    ports::allocate_and_rewire(fleet)?;
    persist_all(fleet, dry_run)
}

fn persist_all(fleet: &Fleet, dry_run: bool) -> Result<Vec<ServiceWrite>, SyncError> {
    fleet.iter().map(|service| persist(service, dry_run)).collect()
}

fn persist(service: &Service, dry_run: bool) -> Result<ServiceWrite, SyncError> {
    let diff = if dry_run { diff_dotenv(service)? } else { None };
    let result = save_dotenv(service, dry_run)?;
    Ok(ServiceWrite {
        service: service.name(),
        result,
        diff,
    })
}
