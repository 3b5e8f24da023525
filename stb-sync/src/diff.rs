//! Dry-run unified diff support for env refreshes.

use std::path::PathBuf;

use similar::TextDiff;

use stb_core::{Service, ServiceName};

use crate::{writer::read_existing_or_empty, SyncError};

/// Pending change to one service's `.env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDiff {
    pub service: ServiceName,
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Compare the in-memory env of `service` with its file on disk.
///
/// Returns `None` when saving would not change the file. No files are written.
pub fn diff_dotenv(service: &Service) -> Result<Option<EnvDiff>, SyncError> {
    let path = service.dotenv_path();
    let existing = read_existing_or_empty(&path)?;
    let rendered = service.dotenv.render();
    if existing == rendered {
        return Ok(None);
    }

    let name = service.name();
    let old_header = format!("a/{name}/.env");
    let new_header = format!("b/{name}/.env");
    let unified = TextDiff::from_lines(&existing, &rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(Some(EnvDiff {
        service: name,
        path,
        unified_diff: unified,
    }))
}
