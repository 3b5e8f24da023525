//! User configuration and process-wide override variables.
//!
//! # Storage layout
//!
//! ```text
//! ~/.stb/             (mode 0700)
//!   config.yaml       (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// On-disk configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Defaults for env fields whose template value is empty.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.stb/`
pub fn stb_dir_at(home: &Path) -> PathBuf {
    home.join(".stb")
}

/// `<home>/.stb/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    stb_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load / save
// ---------------------------------------------------------------------------

/// Load the configuration. A missing file yields the default configuration.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the configuration, stamping `updated_at`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = stb_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }

    let mut stamped = config.clone();
    stamped.updated_at = Some(Utc::now());

    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");
    let yaml = serde_yaml::to_string(&stamped)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

/// Set one override variable and persist. Returns the previous value.
pub fn set_env_var_at(home: &Path, name: &str, value: &str) -> Result<Option<String>, ConfigError> {
    let mut config = load_at(home)?;
    let previous = config.env_vars.insert(name.to_string(), value.to_string());
    save_at(home, &config)?;
    Ok(previous)
}

/// Remove one override variable and persist. Returns the removed value.
pub fn unset_env_var_at(home: &Path, name: &str) -> Result<Option<String>, ConfigError> {
    let mut config = load_at(home)?;
    let removed = config.env_vars.remove(name);
    if removed.is_some() {
        save_at(home, &config)?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// 3. Override variables
// ---------------------------------------------------------------------------

/// Read-only mapping of env var name → default value consulted when a
/// template field has no default of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides(BTreeMap<String, String>);

impl EnvOverrides {
    /// Config-file values, with non-empty variables from the real process
    /// environment taking precedence.
    pub fn from_config_and_process(config: &Config) -> Self {
        Self::from_config_and_vars(config, std::env::vars_os())
    }

    /// Same merge over an explicit variable list. Names or values that are
    /// not valid UTF-8 are skipped.
    pub fn from_config_and_vars<I>(config: &Config, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut merged = config.env_vars.clone();
        merged.extend(
            vars.into_iter()
                .filter_map(|(name, value)| {
                    Some((name.into_string().ok()?, value.into_string().ok()?))
                })
                .filter(|(_, value)| !value.is_empty()),
        );
        Self(merged)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvOverrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_default() {
        let home = TempDir::new().unwrap();
        assert_eq!(load_at(home.path()).unwrap(), Config::default());
    }

    #[test]
    fn save_stamps_updated_at_and_cleans_tmp() {
        let home = TempDir::new().unwrap();
        save_at(home.path(), &Config::default()).unwrap();
        let loaded = load_at(home.path()).unwrap();
        assert!(loaded.updated_at.is_some());
        assert!(!stb_dir_at(home.path()).join("config.yaml.tmp").exists());
    }

    #[test]
    #[cfg(unix)]
    fn config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let home = TempDir::new().unwrap();
        save_at(home.path(), &Config::default()).unwrap();
        let mode = std::fs::metadata(config_path_at(home.path()))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn set_and_unset_env_var() {
        let home = TempDir::new().unwrap();
        assert_eq!(set_env_var_at(home.path(), "SENTRY_DSN", "x").unwrap(), None);
        assert_eq!(
            set_env_var_at(home.path(), "SENTRY_DSN", "y").unwrap(),
            Some("x".to_string())
        );
        assert_eq!(
            load_at(home.path()).unwrap().env_vars.get("SENTRY_DSN"),
            Some(&"y".to_string())
        );
        assert_eq!(
            unset_env_var_at(home.path(), "SENTRY_DSN").unwrap(),
            Some("y".to_string())
        );
        assert!(load_at(home.path()).unwrap().env_vars.is_empty());
    }

    #[test]
    fn overrides_from_iter() {
        let overrides: EnvOverrides = [("A", "1")].into_iter().collect();
        assert_eq!(overrides.get("A"), Some("1"));
        assert_eq!(overrides.get("B"), None);
    }

    #[test]
    fn process_values_win_unless_empty() {
        let mut config = Config::default();
        config.env_vars.insert("A".into(), "file".into());
        config.env_vars.insert("B".into(), "file".into());
        let vars = [("A", "process"), ("B", "")]
            .map(|(name, value)| (OsString::from(name), OsString::from(value)));

        let overrides = EnvOverrides::from_config_and_vars(&config, vars);
        assert_eq!(overrides.get("A"), Some("process"));
        assert_eq!(overrides.get("B"), Some("file"));
    }

    #[test]
    #[cfg(unix)]
    fn non_utf8_variables_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bytes = OsStr::from_bytes(b"\xff\xfe").to_os_string();
        let vars = vec![
            (OsString::from("STB_BYTES"), bytes.clone()),
            (bytes, OsString::from("x")),
            (OsString::from("OK"), OsString::from("1")),
        ];

        let overrides = EnvOverrides::from_config_and_vars(&Config::default(), vars);
        assert_eq!(overrides.get("STB_BYTES"), None);
        assert_eq!(overrides.get("OK"), Some("1"));
    }
}
