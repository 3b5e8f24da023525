//! Per-deployment-stage defaults read from a service's Helm values file.
//!
//! The manifest is a YAML mapping of lowercase field name to a mapping of
//! stage name to value:
//!
//! ```yaml
//! billing_url:
//!   review: https://billing.review.example.com
//!   production: https://billing.example.com
//! ```
//!
//! Entries whose value is not a mapping are ignored; scalar stage values are
//! stringified.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{io_err, DiscoveryError};

/// Stage whose defaults are used when rewiring URLs for local development.
pub const REVIEW_STAGE: &str = "review";

/// Candidate manifest locations, relative to the service directory, in
/// lookup order.
pub const MANIFEST_CANDIDATES: &[&str] = &[
    ".helm/values.yaml",
    ".helm/values.yml",
    "helm/values.yaml",
    "helm/values.yml",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    fields: BTreeMap<String, BTreeMap<String, String>>,
}

impl Manifest {
    /// Parse manifest YAML. An empty document yields an empty manifest.
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: Value = serde_yaml::from_str(content)?;
        let mut fields = BTreeMap::new();

        if let Value::Mapping(map) = root {
            for (key, value) in map {
                let (Some(field), Value::Mapping(stages)) = (scalar_to_string(&key), value) else {
                    continue;
                };
                let stages: BTreeMap<String, String> = stages
                    .iter()
                    .filter_map(|(stage, v)| Some((scalar_to_string(stage)?, scalar_to_string(v)?)))
                    .collect();
                fields.insert(field, stages);
            }
        }

        Ok(Self { fields })
    }

    /// Load the first manifest found among [`MANIFEST_CANDIDATES`] under
    /// `dir`, or `None` if the service has none.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, DiscoveryError> {
        for candidate in MANIFEST_CANDIDATES {
            let path = dir.join(candidate);
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let manifest = Self::parse(&content)
                .map_err(|source| DiscoveryError::Manifest { path, source })?;
            return Ok(Some(manifest));
        }
        Ok(None)
    }

    /// Default for env field `field` in `stage`. The field name is
    /// lower-cased before lookup.
    pub fn stage_default(&self, field: &str, stage: &str) -> Option<&str> {
        self.fields
            .get(&field.to_lowercase())?
            .get(stage)
            .map(String::as_str)
    }

    /// Shorthand for the [`REVIEW_STAGE`] default of `field`.
    pub fn review_default(&self, field: &str) -> Option<&str> {
        self.stage_default(field, REVIEW_STAGE)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<F, S, V> FromIterator<(F, S, V)> for Manifest
where
    F: Into<String>,
    S: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (F, S, V)>>(iter: I) -> Self {
        let mut fields: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (field, stage, value) in iter {
            fields
                .entry(field.into())
                .or_default()
                .insert(stage.into(), value.into());
        }
        Self { fields }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
