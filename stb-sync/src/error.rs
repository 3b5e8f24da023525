//! Error types for stb-sync.

use std::path::PathBuf;

use thiserror::Error;

use stb_core::DiscoveryError;

use crate::db::DbError;
use crate::shell::ShellError;

/// All errors that can arise from fleet synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error while building the fleet.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// A subprocess could not be spawned or exited non-zero.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// A database step failed.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// More services than there are ports above the base port.
    #[error("cannot assign ports to {count} services starting at {base}")]
    PortRangeExhausted { base: u16, count: usize },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
