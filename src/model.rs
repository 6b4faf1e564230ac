//! Data model: wire types read from the GitHub API and the structured types
//! the pipeline builds from them, plus the versioned output envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One source repository of the organization, as listed by the repo index.
///
/// Created once per fetch cycle and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub default_branch: String,
    pub archived: bool,
    pub description: Option<String>,
    /// Endpoint returning this repository's release list.
    pub releases_url: String,
    pub html_url: String,
}

/// Raw repository entry as returned by `/orgs/{org}/repos`.
///
/// The `releases_url` field arrives as a URI template (`.../releases{/id}`);
/// [`RawRepository::into_ref`] strips the template suffix.
#[derive(Debug, Deserialize)]
pub struct RawRepository {
    pub name: String,
    pub default_branch: String,
    pub archived: bool,
    pub description: Option<String>,
    pub releases_url: String,
    pub html_url: String,
}

impl RawRepository {
    pub fn into_ref(self) -> RepositoryRef {
        RepositoryRef {
            releases_url: self.releases_url.replace("{/id}", ""),
            name: self.name,
            default_branch: self.default_branch,
            archived: self.archived,
            description: self.description,
            html_url: self.html_url,
        }
    }
}

/// One asset of a release, filtered to archive files before further use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub updated_at: Option<String>,
    pub browser_download_url: String,
}

/// One non-draft release of an application repository, newest first as
/// delivered by the release source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub prerelease: bool,
    pub tag_name: Option<String>,
    pub name: Option<String>,
    pub published_at: Option<String>,
    pub html_url: Option<String>,
    pub body: Option<String>,
    pub assets: Vec<ReleaseAsset>,
}

/// Raw release entry as returned by the releases endpoint.
#[derive(Debug, Deserialize)]
pub struct RawRelease {
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub tag_name: Option<String>,
    pub name: Option<String>,
    pub published_at: Option<String>,
    pub html_url: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
pub struct RawAsset {
    pub name: String,
    pub updated_at: Option<String>,
    pub browser_download_url: String,
}

impl RawRelease {
    /// Keep only archive assets; draft filtering is the caller's concern.
    pub fn into_release(self, archive_suffix: &str) -> Release {
        Release {
            prerelease: self.prerelease,
            tag_name: self.tag_name,
            name: self.name,
            published_at: self.published_at,
            html_url: self.html_url,
            body: self.body,
            assets: self
                .assets
                .into_iter()
                .filter(|a| a.name.ends_with(archive_suffix))
                .map(|a| ReleaseAsset {
                    name: a.name,
                    updated_at: a.updated_at,
                    browser_download_url: a.browser_download_url,
                })
                .collect(),
        }
    }
}

/// One declared first-party dependency of an application.
///
/// Derived entirely from one manifest line; never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub commit: String,
    pub branch: String,
    pub path: String,
    pub url: String,
    pub dep_name: String,
}

/// The parsed compatibility document of an application's latest release:
/// raw device identifiers, in document order, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityDescriptor {
    pub devices: Vec<String>,
}

/// Unified per-application view produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub name: String,
    pub description: String,
    pub archived: bool,
    /// Declared modules, keyed by module name (one entry per module).
    pub modules: BTreeMap<String, DependencyRecord>,
    /// Canonical device names of the latest release, in descriptor order.
    pub devices: Vec<String>,
}

/// Per-application release dataset entry, persisted in `releases.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasesEntry {
    pub repo_url: String,
    pub archived: bool,
    pub description: Option<String>,
    pub releases: Vec<Release>,
}

/// Versioned envelope wrapping every persisted dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "OpenKnxContentType")]
    pub content_type: String,
    #[serde(rename = "OpenKnxFormatVersion")]
    pub format_version: String,
    pub data: T,
}

pub const CONTENT_TYPE_RELEASES: &str = "OpenKNX/OAM/Releases";
pub const RELEASES_FORMAT_VERSION: &str = "v0.0.0-ALPHA";

impl<T> Envelope<T> {
    pub fn releases(data: T) -> Self {
        Self {
            content_type: CONTENT_TYPE_RELEASES.to_string(),
            format_version: RELEASES_FORMAT_VERSION.to_string(),
            data,
        }
    }
}
