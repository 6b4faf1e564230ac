//! Persisted artifacts and the report-emitter boundary.
//!
//! The pipeline writes versioned JSON datasets for downstream consumers and
//! hands the aggregated [`Overview`] to a [`ReportSink`]. Page rendering
//! itself lives behind the trait; [`JsonSink`] is the concrete emitter that
//! persists the overview dataset the static site is generated from.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::aggregate::Overview;
use crate::model::{DependencyRecord, Envelope, ReleasesEntry};

pub const RELEASES_FILE: &str = "releases.json";
pub const HARDWARE_FILE: &str = "hardware_mapping.json";
pub const DEPENDENCIES_FILE: &str = "dependencies.json";
pub const OVERVIEW_FILE: &str = "overview.json";

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write artifact {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives the aggregated overview for rendering. Implemented by the JSON
/// emitter here and by page renderers elsewhere; mockable for pipeline tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn render(
        &self,
        overview: &Overview,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes all datasets as pretty-printed JSON under one output directory.
pub struct JsonSink {
    output_dir: PathBuf,
}

impl JsonSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> Result<PathBuf, EmitError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| EmitError::Io {
            path: self.output_dir.display().to_string(),
            source,
        })?;
        let path = self.output_dir.join(filename);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| EmitError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "Wrote artifact");
        Ok(path)
    }

    pub fn write_releases(
        &self,
        data: &Envelope<BTreeMap<String, ReleasesEntry>>,
    ) -> Result<PathBuf, EmitError> {
        self.write_json(RELEASES_FILE, data)
    }

    pub fn write_hardware(
        &self,
        hardware: &BTreeMap<String, Vec<String>>,
    ) -> Result<PathBuf, EmitError> {
        self.write_json(HARDWARE_FILE, hardware)
    }

    /// Only applications with at least one dependency are persisted here.
    pub fn write_dependencies(
        &self,
        dependencies: &BTreeMap<String, BTreeMap<String, DependencyRecord>>,
    ) -> Result<PathBuf, EmitError> {
        let non_empty: BTreeMap<&String, &BTreeMap<String, DependencyRecord>> = dependencies
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .collect();
        self.write_json(DEPENDENCIES_FILE, &non_empty)
    }
}

#[async_trait]
impl ReportSink for JsonSink {
    async fn render(
        &self,
        overview: &Overview,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_json(OVERVIEW_FILE, overview)?;
        Ok(())
    }
}

static NON_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("hardcoded regex compiles"));

const UMLAUTS: [(&str, &str); 7] = [
    ("\u{00e4}", "ae"),
    ("\u{00f6}", "oe"),
    ("\u{00fc}", "ue"),
    ("\u{00df}", "ss"),
    ("\u{00c4}", "Ae"),
    ("\u{00d6}", "Oe"),
    ("\u{00dc}", "Ue"),
];

/// Filesystem-safe site path segment for a device name: umlauts are
/// transliterated, everything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn device_pathname(device_name: &str) -> String {
    let mut name = device_name.to_string();
    for (umlaut, replacement) in UMLAUTS {
        name = name.replace(umlaut, replacement);
    }
    NON_PATH_CHARS.replace_all(&name, "_").into_owned()
}
