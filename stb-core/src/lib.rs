//! stb core library: fleet domain types, env-file model, discovery, config.
//!
//! - [`types`]: [`Service`], [`Fleet`], [`StashRecord`]
//! - [`dotenv`]: order-preserving `.env` model
//! - [`manifest`]: per-stage defaults from Helm values
//! - [`discovery`]: builds the fleet from service paths
//! - [`config`]: `~/.stb/config.yaml` and override variables
//! - [`error`]: [`DiscoveryError`], [`ConfigError`]

pub mod config;
pub mod discovery;
pub mod dotenv;
pub mod error;
pub mod manifest;
pub mod types;

pub use config::{Config, EnvOverrides};
pub use dotenv::DotEnv;
pub use error::{ConfigError, DiscoveryError};
pub use manifest::Manifest;
pub use types::{Fleet, Service, ServiceName, StashRecord};
