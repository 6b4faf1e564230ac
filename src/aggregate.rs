//! Aggregator: joins per-application data into [`ApplicationRecord`]s and
//! derives the frequency-ranked usage indexes over modules and devices.
//!
//! Every index in the system shares one ordering contract, implemented once
//! in [`UsageIndex::from_counts`]: descending by count, ties broken by
//! ascending lexicographic key. Report sections must consume these indexes
//! as-is, never re-sort.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::info;

use crate::devices::DeviceNameMap;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::model::{ApplicationRecord, DependencyRecord};

/// One key of a usage index with its application (or occurrence) count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    pub name: String,
    pub count: usize,
}

/// Frequency-ranked, deterministically ordered index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageIndex {
    pub entries: Vec<UsageEntry>,
}

impl UsageIndex {
    /// The single sorting rule shared by all indexes.
    pub fn from_counts(counts: HashMap<String, usize>) -> Self {
        let mut entries: Vec<UsageEntry> = counts
            .into_iter()
            .map(|(name, count)| UsageEntry { name, count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Self { entries }
    }

    pub fn count_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.count)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Repository-derived shell an application record is built around.
#[derive(Debug, Clone)]
pub struct AppShell {
    pub name: String,
    pub description: Option<String>,
    pub archived: bool,
}

/// The unified aggregation result handed to the report emitter.
///
/// The reverse indexes are materialized here so the persisted overview
/// carries them; consumers of the artifact never have to re-derive them.
#[derive(Debug, Serialize)]
pub struct Overview {
    pub applications: BTreeMap<String, ApplicationRecord>,
    pub modules: UsageIndex,
    pub devices_first_party: UsageIndex,
    pub devices_other: UsageIndex,
    /// Per module: the devices of the applications that contain it.
    pub module_devices: BTreeMap<String, UsageIndex>,
    /// Per device: the modules of the applications that support it.
    pub device_modules: BTreeMap<String, UsageIndex>,
}

impl Overview {
    /// Devices supported by the applications that contain `module`,
    /// counted per occurrence, ordered by the shared rule.
    pub fn devices_for_module(&self, module: &str) -> UsageIndex {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for app in self.applications.values() {
            if app.modules.contains_key(module) {
                for device in &app.devices {
                    *counts.entry(device.clone()).or_insert(0) += 1;
                }
            }
        }
        UsageIndex::from_counts(counts)
    }

    /// Modules contained in the applications that support `device`,
    /// counted once per application, ordered by the shared rule.
    pub fn modules_for_device(&self, device: &str) -> UsageIndex {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for app in self.applications.values() {
            if app.devices.iter().any(|d| d == device) {
                for module in app.modules.keys() {
                    *counts.entry(module.clone()).or_insert(0) += 1;
                }
            }
        }
        UsageIndex::from_counts(counts)
    }
}

/// Join shells, dependency maps and raw device lists into one [`Overview`].
///
/// The output covers the union of application names across all three inputs;
/// an application missing from the shells or the hardware source is filled
/// with placeholders and reported as a consistency finding, never dropped.
pub fn aggregate(
    shells: &BTreeMap<String, AppShell>,
    dependencies: &BTreeMap<String, BTreeMap<String, DependencyRecord>>,
    hardware: &BTreeMap<String, Vec<String>>,
    devices: &DeviceNameMap,
    placeholder_description: &str,
    diagnostics: &mut Diagnostics,
) -> Overview {
    let names: BTreeSet<&String> = shells
        .keys()
        .chain(dependencies.keys())
        .chain(hardware.keys())
        .collect();

    let mut applications = BTreeMap::new();
    for name in names {
        let shell = shells.get(name);
        if shell.is_none() {
            diagnostics.push(Diagnostic::MissingDescription { app: name.clone() });
        }
        let description = shell
            .and_then(|s| s.description.clone())
            .unwrap_or_else(|| placeholder_description.to_string());
        let archived = shell.map(|s| s.archived).unwrap_or(false);

        let modules = dependencies.get(name).cloned().unwrap_or_default();

        let normalized_devices = match hardware.get(name) {
            Some(raw_devices) => raw_devices
                .iter()
                .map(|raw| devices.normalize(name, raw, diagnostics))
                .collect(),
            None => {
                diagnostics.push(Diagnostic::MissingHardware { app: name.clone() });
                Vec::new()
            }
        };

        applications.insert(
            name.clone(),
            ApplicationRecord {
                name: name.clone(),
                description,
                archived,
                modules,
                devices: normalized_devices,
            },
        );
    }

    let mut module_counts: HashMap<String, usize> = HashMap::new();
    let mut first_party_counts: HashMap<String, usize> = HashMap::new();
    let mut other_counts: HashMap<String, usize> = HashMap::new();
    for app in applications.values() {
        // Once per referencing application; the per-app map already
        // deduplicates multiple dependency paths onto one module.
        for module in app.modules.keys() {
            *module_counts.entry(module.clone()).or_insert(0) += 1;
        }
        // Once per occurrence; one application may ship several variants of
        // the same device family.
        for device in &app.devices {
            let counts = if devices.is_first_party(device) {
                &mut first_party_counts
            } else {
                &mut other_counts
            };
            *counts.entry(device.clone()).or_insert(0) += 1;
        }
    }

    let mut overview = Overview {
        applications,
        modules: UsageIndex::from_counts(module_counts),
        devices_first_party: UsageIndex::from_counts(first_party_counts),
        devices_other: UsageIndex::from_counts(other_counts),
        module_devices: BTreeMap::new(),
        device_modules: BTreeMap::new(),
    };
    let module_devices: BTreeMap<String, UsageIndex> = overview
        .modules
        .names()
        .map(|module| (module.to_string(), overview.devices_for_module(module)))
        .collect();
    let device_modules: BTreeMap<String, UsageIndex> = overview
        .devices_first_party
        .names()
        .chain(overview.devices_other.names())
        .map(|device| (device.to_string(), overview.modules_for_device(device)))
        .collect();
    overview.module_devices = module_devices;
    overview.device_modules = device_modules;
    info!(
        applications = overview.applications.len(),
        modules = overview.modules.len(),
        devices_first_party = overview.devices_first_party.len(),
        devices_other = overview.devices_other.len(),
        "Aggregation complete"
    );
    overview
}
