//! Top-level pipeline: classify → fetch per application → aggregate → emit.
//!
//! Per-application fetches are independent and run concurrently; the join
//! step runs only after all of them completed (the `try_join_all` barrier,
//! which also gives the fail-fast contract for transport faults). Each task
//! accumulates its own diagnostics, merged after the barrier, so no shared
//! state is mutated during the fan-out.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::aggregate::{aggregate, AppShell, Overview};
use crate::classifier::select_applications;
use crate::config::Config;
use crate::dependencies::{parse_manifest, ManifestOutcome};
use crate::devices::DeviceNameMap;
use crate::diagnostics::Diagnostics;
use crate::emit::{EmitError, JsonSink, ReportSink};
use crate::github::{FetchError, ReleaseHost};
use crate::hardware::latest_release_devices;
use crate::model::{Envelope, ReleasesEntry, RepositoryRef};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("report rendering failed: {0}")]
    Render(String),
}

/// Summary of one completed run.
#[derive(Debug)]
pub struct RunReport {
    pub applications: usize,
    pub applications_with_devices: usize,
    pub diagnostics: usize,
}

/// Everything fetched for one application, before the join.
struct AppData {
    repo: RepositoryRef,
    releases: Vec<crate::model::Release>,
    manifest: ManifestOutcome,
    raw_devices: Vec<String>,
    diagnostics: Diagnostics,
}

async fn collect_app<H>(config: &Config, host: &H, repo: &RepositoryRef) -> Result<AppData, FetchError>
where
    H: ReleaseHost + Sync + ?Sized,
{
    let mut diagnostics = Diagnostics::new();

    let releases = host.releases(repo).await?;
    debug!(app = %repo.name, releases = releases.len(), "Fetched release list");

    // A missing manifest reads as zero dependencies, without a diagnostic.
    let manifest = match host.manifest_text(repo).await? {
        Some(text) => parse_manifest(&repo.name, &text, &config.modules, &mut diagnostics),
        None => ManifestOutcome::empty(),
    };

    let descriptor = latest_release_devices(host, &repo.name, &releases, &mut diagnostics).await?;
    let raw_devices = descriptor.map(|d| d.devices).unwrap_or_default();

    Ok(AppData {
        repo: repo.clone(),
        releases,
        manifest,
        raw_devices,
        diagnostics,
    })
}

/// Run the full aggregation. Returns the overview (also rendered through
/// `sink`) and a run summary. Transport faults abort; everything else is
/// carried as diagnostics.
pub async fn run<H, S>(
    config: &Config,
    host: &H,
    devices: &DeviceNameMap,
    sink: &S,
) -> Result<(Overview, RunReport), PipelineError>
where
    H: ReleaseHost + Sync + ?Sized,
    S: ReportSink + Sync + ?Sized,
{
    info!("[RUN] Starting aggregation pipeline");

    let repos = host.org_repos().await?;
    let apps = select_applications(&repos, &config.selection);
    info!(
        repos = repos.len(),
        applications = apps.len(),
        "Classified application repositories"
    );

    // Fan out per application; barrier before the join.
    let collected = try_join_all(apps.iter().map(|repo| collect_app(config, host, repo))).await?;

    let mut diagnostics = Diagnostics::new();
    let mut shells: BTreeMap<String, AppShell> = BTreeMap::new();
    let mut releases_data: BTreeMap<String, ReleasesEntry> = BTreeMap::new();
    let mut dependencies = BTreeMap::new();
    let mut hardware: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for data in collected {
        let name = data.repo.name.clone();
        diagnostics.merge(data.diagnostics);
        shells.insert(
            name.clone(),
            AppShell {
                name: name.clone(),
                description: data.repo.description.clone(),
                archived: data.repo.archived,
            },
        );
        releases_data.insert(
            name.clone(),
            ReleasesEntry {
                repo_url: data.repo.html_url.clone(),
                archived: data.repo.archived,
                description: data.repo.description.clone(),
                releases: data.releases,
            },
        );
        dependencies.insert(name.clone(), data.manifest.records);
        hardware.insert(name, data.raw_devices);
    }

    let json_sink = JsonSink::new(config.output_dir.clone());
    json_sink.write_releases(&Envelope::releases(releases_data))?;
    json_sink.write_hardware(&hardware)?;
    json_sink.write_dependencies(&dependencies)?;

    let overview = aggregate(
        &shells,
        &dependencies,
        &hardware,
        devices,
        &config.placeholder_description,
        &mut diagnostics,
    );

    if let Err(e) = sink.render(&overview).await {
        error!(error = %e, "[RUN][ERROR] Report rendering failed");
        return Err(PipelineError::Render(e.to_string()));
    }

    let report = RunReport {
        applications: overview.applications.len(),
        applications_with_devices: overview
            .applications
            .values()
            .filter(|app| !app.devices.is_empty())
            .count(),
        diagnostics: diagnostics.len(),
    };
    info!(
        applications = report.applications,
        with_devices = report.applications_with_devices,
        diagnostics = report.diagnostics,
        "[RUN] Aggregation pipeline complete"
    );

    Ok((overview, report))
}
