//! Runtime configuration for one aggregation run.
//!
//! All curated tables the components depend on (application selection sets,
//! the module naming policy, the brand marker) live here as explicit data,
//! loaded once and passed into the components that need them. Nothing in the
//! pipeline reads ambient global state.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which repositories of the organization count as applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Name prefix identifying application repositories.
    pub app_prefix: String,
    /// Application repositories that do not carry the prefix.
    #[serde(default)]
    pub special_names: BTreeSet<String>,
    /// Repositories excluded even though they match prefix or specials.
    #[serde(default)]
    pub exclusions: BTreeSet<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            app_prefix: "OAM-".to_string(),
            special_names: [
                "SOM-UP",
                "GW-REG1-Dali",
                "SEN-UP1-8xTH",
                "BEM-GardenControl",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclusions: ["OAM-TestApp"].into_iter().map(String::from).collect(),
        }
    }
}

/// Which declared dependencies count as first-party modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulePolicy {
    /// URL prefix of the organization's own namespace.
    pub namespace_url: String,
    /// Accepted module name prefixes for legacy (URL-less) records.
    pub accepted_prefixes: Vec<String>,
    /// Literal names accepted despite not matching any prefix.
    #[serde(default)]
    pub name_exceptions: BTreeSet<String>,
    /// Modules suppressed from every dependency map, regardless of source shape.
    #[serde(default)]
    pub suppressed: BTreeSet<String>,
}

impl Default for ModulePolicy {
    fn default() -> Self {
        Self {
            namespace_url: "https://github.com/OpenKNX/".to_string(),
            accepted_prefixes: vec!["OFM-".to_string(), "OGM-".to_string()],
            name_exceptions: ["knx"].into_iter().map(String::from).collect(),
            // No end-user function, keep it out of all overviews.
            suppressed: ["OFM-SmartMF"].into_iter().map(String::from).collect(),
        }
    }
}

impl ModulePolicy {
    /// Synthetic source URL for a legacy record that carries no URL column.
    pub fn synthetic_url(&self, dep_name: &str) -> String {
        format!("{}{}.git", self.namespace_url, dep_name)
    }

    pub fn is_first_party_url(&self, url: &str) -> bool {
        url.starts_with(&self.namespace_url)
    }

    pub fn is_suppressed(&self, dep_name: &str) -> bool {
        self.suppressed.contains(dep_name)
    }

    /// Name-convention check used for legacy records without a URL column.
    pub fn matches_naming_convention(&self, dep_name: &str) -> bool {
        self.accepted_prefixes
            .iter()
            .any(|p| dep_name.starts_with(p.as_str()))
            || self.name_exceptions.contains(dep_name)
    }
}

/// Where and how to reach the organization on GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    pub api_base_url: String,
    pub raw_base_url: String,
    pub org_name: String,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            raw_base_url: "https://raw.githubusercontent.com".to_string(),
            org_name: "OpenKNX".to_string(),
        }
    }
}

/// Full configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub org: OrgConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub modules: ModulePolicy,
    /// Substring marking a canonical device name as a first-party device.
    #[serde(default = "default_brand_marker")]
    pub brand_marker: String,
    /// Description used when an application has none.
    #[serde(default = "default_placeholder_description")]
    pub placeholder_description: String,
    /// Ordered device-name rule file (raw → canonical, last writer wins).
    pub devices_file: PathBuf,
    /// Directory the JSON artifacts are written into.
    pub output_dir: PathBuf,
}

fn default_brand_marker() -> String {
    "OpenKNX".to_string()
}

fn default_placeholder_description() -> String {
    "(no description)".to_string()
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            org = %self.org.org_name,
            app_prefix = %self.selection.app_prefix,
            special_names = self.selection.special_names.len(),
            exclusions = self.selection.exclusions.len(),
            devices_file = %self.devices_file.display(),
            output_dir = %self.output_dir.display(),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_module_policy_accepts_known_shapes() {
        let policy = ModulePolicy::default();
        assert!(policy.matches_naming_convention("OFM-LogicModule"));
        assert!(policy.matches_naming_convention("OGM-Common"));
        assert!(policy.matches_naming_convention("knx"));
        assert!(!policy.matches_naming_convention("lib-external"));
        assert!(policy.is_suppressed("OFM-SmartMF"));
    }

    #[test]
    fn synthetic_url_points_into_namespace() {
        let policy = ModulePolicy::default();
        let url = policy.synthetic_url("OFM-Common");
        assert_eq!(url, "https://github.com/OpenKNX/OFM-Common.git");
        assert!(policy.is_first_party_url(&url));
    }
}
