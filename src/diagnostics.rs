//! Collectable diagnostics for non-fatal findings.
//!
//! The pipeline must keep going through malformed manifests, unknown device
//! names and inconsistent upstream data, while still surfacing every finding.
//! Pushing a [`Diagnostic`] both records it (so tests and reports can count
//! exact occurrences) and emits a `tracing` event at the appropriate level.

use tracing::{error, warn};

/// One non-fatal finding raised while collecting or joining data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A dependency manifest contained legacy 3-field lines.
    LegacyManifestLines {
        app: String,
        count: usize,
        total: usize,
    },
    /// A dependency manifest contained lines with an unrecognised field count.
    InvalidManifestLines {
        app: String,
        count: usize,
        total: usize,
    },
    /// A module was accepted from a legacy line by lib-path naming only.
    LegacyModuleByPath { app: String, module: String },
    /// A legacy line named something that is not a recognised module.
    UnexpectedLegacyModule { app: String, name: String },
    /// A raw device identifier resolved through an application-specific override.
    DeviceOverride { app: String, raw: String },
    /// A raw device identifier has no mapping at all.
    UnknownDevice { app: String, raw: String },
    /// A release asset's descriptor failed to parse even after repair.
    DescriptorUnparseable {
        app: String,
        asset: String,
        reason: String,
    },
    /// An application was missing from the descriptions source during the join.
    MissingDescription { app: String },
    /// An application was missing from the hardware source during the join.
    MissingHardware { app: String },
}

/// Append-only sink of diagnostics for one run (or one per-app task).
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and trace it.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::LegacyManifestLines { app, count, total } => warn!(
                app = %app,
                count,
                total,
                "Incomplete dependencies.txt format (legacy 3-field lines)"
            ),
            Diagnostic::InvalidManifestLines { app, count, total } => error!(
                app = %app,
                count,
                total,
                "Invalid dependencies.txt format"
            ),
            Diagnostic::LegacyModuleByPath { app, module } => warn!(
                app = %app,
                module = %module,
                "((>>WORKAROUND<<)) Expect module by lib-path only"
            ),
            Diagnostic::UnexpectedLegacyModule { app, name } => warn!(
                app = %app,
                name = %name,
                "Unexpected lib in incomplete dependencies.txt"
            ),
            Diagnostic::DeviceOverride { app, raw } => warn!(
                app = %app,
                raw = %raw,
                "((>>WORKAROUND<<)) OAM-specific mapping of device name"
            ),
            Diagnostic::UnknownDevice { app, raw } => warn!(
                app = %app,
                raw = %raw,
                "Unknown device name"
            ),
            Diagnostic::DescriptorUnparseable { app, asset, reason } => warn!(
                app = %app,
                asset = %asset,
                reason = %reason,
                "Release descriptor unparseable after repair"
            ),
            Diagnostic::MissingDescription { app } => warn!(
                app = %app,
                "Application missing from descriptions source; using placeholder"
            ),
            Diagnostic::MissingHardware { app } => warn!(
                app = %app,
                "Application missing from hardware source; using empty device list"
            ),
        }
        self.entries.push(diagnostic);
    }

    /// Move all entries of `other` into this sink, preserving order.
    pub fn merge(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count entries matching a predicate, for targeted assertions and summaries.
    pub fn count_where(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.entries.iter().filter(|d| predicate(d)).count()
    }
}
