//! Aggregation and normalization pipeline for OpenKNX application metadata.
//!
//! Collects, per application repository: the release history, the declared
//! module dependencies (`dependencies.txt` across all its historical format
//! variants), and the hardware the latest release supports (descriptor XML
//! embedded in the release archive). Device identifiers are normalized
//! through a curated rule table, and everything is joined into
//! cross-referenced, frequency-ranked indexes for the documentation site.

pub mod aggregate;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod dependencies;
pub mod devices;
pub mod diagnostics;
pub mod emit;
pub mod github;
pub mod hardware;
pub mod load_config;
pub mod model;
pub mod pipeline;
