//! Device name normalizer.
//!
//! Firmware releases report hardware under years of inconsistent spellings.
//! A curated, ordered rule list collapses them to canonical display names.
//! Rules are applied last-writer-wins, so later corrections override earlier
//! entries without editing history. A rule key of the form `raw@application`
//! overrides the bare mapping for that one application.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::{Diagnostic, Diagnostics};

/// Marker prepended to unmapped identifiers so they stay visible in reports.
pub const UNKNOWN_DEVICE_PREFIX: &str = "(???)-";

/// One curated mapping rule, as stored in the rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    /// Raw identifier as reported by a release, optionally `@application`-qualified.
    pub raw: String,
    /// Canonical display name.
    pub canonical: String,
}

#[derive(Debug, Error)]
pub enum DeviceMapError {
    #[error("failed to read device rules from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse device rules: {0}")]
    Format(#[from] serde_json::Error),
}

/// Process-wide, read-only raw → canonical device mapping.
pub struct DeviceNameMap {
    map: HashMap<String, String>,
    brand_marker: String,
}

impl DeviceNameMap {
    /// Build the lookup from ordered rules; a later rule for the same raw key
    /// replaces the earlier one.
    pub fn from_rules(rules: Vec<DeviceRule>, brand_marker: impl Into<String>) -> Self {
        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            if let Some(previous) = map.insert(rule.raw.clone(), rule.canonical) {
                debug!(raw = %rule.raw, previous = %previous, "Device rule overridden by later entry");
            }
        }
        Self {
            map,
            brand_marker: brand_marker.into(),
        }
    }

    pub fn from_json(text: &str, brand_marker: impl Into<String>) -> Result<Self, DeviceMapError> {
        let rules: Vec<DeviceRule> = serde_json::from_str(text)?;
        Ok(Self::from_rules(rules, brand_marker))
    }

    pub fn load(path: &Path, brand_marker: &str) -> Result<Self, DeviceMapError> {
        let text = fs::read_to_string(path).map_err(|source| DeviceMapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, brand_marker)
    }

    /// Canonical name for `raw` as reported by `app`.
    ///
    /// Resolution order: `raw@app` override, then the bare mapping, then a
    /// traceable placeholder embedding the original identifier.
    pub fn normalize(&self, app: &str, raw: &str, diagnostics: &mut Diagnostics) -> String {
        let qualified = format!("{raw}@{app}");
        if let Some(canonical) = self.map.get(&qualified) {
            diagnostics.push(Diagnostic::DeviceOverride {
                app: app.to_string(),
                raw: raw.to_string(),
            });
            return canonical.clone();
        }
        if let Some(canonical) = self.map.get(raw) {
            return canonical.clone();
        }
        diagnostics.push(Diagnostic::UnknownDevice {
            app: app.to_string(),
            raw: raw.to_string(),
        });
        format!("{UNKNOWN_DEVICE_PREFIX}{raw}")
    }

    /// A canonical name is first-party when the brand marker appears in it.
    pub fn is_first_party(&self, canonical: &str) -> bool {
        canonical.contains(&self.brand_marker)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
