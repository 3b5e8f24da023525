//! Domain types for a fleet of local service checkouts.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dotenv::DotEnv;
use crate::error::DiscoveryError;
use crate::manifest::Manifest;

/// Env file every service reads at startup.
pub const DOTENV_FILE: &str = ".env";
/// Committed template listing every field the service expects.
pub const DOTENV_EXAMPLE_FILE: &str = ".env.example";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Short name of a service: the final component of its directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl ServiceName {
    /// Derive the name from a service directory.
    pub fn from_dir(dir: &Path) -> Self {
        Self(
            dir.file_name()
                .unwrap_or(dir.as_os_str())
                .to_string_lossy()
                .into_owned(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Snapshot of one service checkout, built fresh per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Root of the checkout; its final component is the service name.
    pub dir: PathBuf,
    /// Current contents of `<dir>/.env`.
    pub dotenv: DotEnv,
    /// Template defaults from `<dir>/.env.example`.
    pub dotenv_example: DotEnv,
    /// Helm values defaults, when the service ships a manifest.
    pub yaml_config: Option<Manifest>,
}

impl Service {
    /// A service with empty env files and no manifest.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dotenv: DotEnv::new(),
            dotenv_example: DotEnv::new(),
            yaml_config: None,
        }
    }

    pub fn name(&self) -> ServiceName {
        ServiceName::from_dir(&self.dir)
    }

    pub fn dotenv_path(&self) -> PathBuf {
        self.dir.join(DOTENV_FILE)
    }

    pub fn dotenv_example_path(&self) -> PathBuf {
        self.dir.join(DOTENV_EXAMPLE_FILE)
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Ordered set of services synchronized together in one run.
///
/// Order is discovery order and is significant: it decides port assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fleet {
    services: Vec<Service>,
}

impl Fleet {
    /// Build a fleet, rejecting two services with the same name.
    pub fn new(services: Vec<Service>) -> Result<Self, DiscoveryError> {
        for (idx, service) in services.iter().enumerate() {
            let name = service.name();
            if let Some(earlier) = services[..idx].iter().find(|s| s.name() == name) {
                return Err(DiscoveryError::DuplicateService {
                    name: name.0,
                    first: earlier.dir.clone(),
                    second: service.dir.clone(),
                });
            }
        }
        Ok(Self { services })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Service> {
        self.services.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Service> {
        self.services.iter_mut()
    }

    pub fn get(&self, name: &ServiceName) -> Option<&Service> {
        self.services.iter().find(|s| &s.name() == name)
    }

    pub fn names(&self) -> Vec<ServiceName> {
        self.services.iter().map(Service::name).collect()
    }

    pub fn into_services(self) -> Vec<Service> {
        self.services
    }
}

impl<'a> IntoIterator for &'a Fleet {
    type Item = &'a Service;
    type IntoIter = std::slice::Iter<'a, Service>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a mut Fleet {
    type Item = &'a mut Service;
    type IntoIter = std::slice::IterMut<'a, Service>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// ---------------------------------------------------------------------------
// Stash record
// ---------------------------------------------------------------------------

/// Uncommitted work that was stashed before a forced checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashRecord {
    pub service: ServiceName,
    pub branch: String,
}

impl fmt::Display for StashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.branch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
