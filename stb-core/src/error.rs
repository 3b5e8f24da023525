//! Error types for stb-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can arise while building a fleet from service directories.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Underlying I/O failure, annotated with the path being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A requested service path does not exist or is not a directory.
    #[error("service directory not found: {path}")]
    ServiceNotFound { path: PathBuf },

    /// The manifest (Helm values) file exists but is not valid YAML.
    #[error("failed to parse manifest at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two services in one fleet share a directory name.
    #[error("service '{name}' appears more than once ({first} and {second})")]
    DuplicateService {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Errors that can arise from reading or writing the user configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.stb/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DiscoveryError {
    DiscoveryError::Io {
        path: path.into(),
        source,
    }
}
