use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::devices::DeviceNameMap;
use crate::emit::JsonSink;
use crate::github::GitHubClient;
use crate::load_config::load_config;
use crate::pipeline;

#[derive(Parser)]
#[clap(
    name = "oam-index",
    version,
    about = "Aggregate release, module and device metadata across OpenKNX application repositories"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect all application data and write the overview datasets
    Update {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Update { config } => {
            let config = load_config(config)?;
            config.trace_loaded();

            let devices = DeviceNameMap::load(&config.devices_file, &config.brand_marker)?;
            tracing::info!(rules = devices.len(), "Loaded device name rules");

            let host = GitHubClient::new(config.org.clone())?;
            let sink = JsonSink::new(config.output_dir.clone());

            println!("Update starting...");
            let (_, report) = pipeline::run(&config, &host, &devices, &sink).await?;
            println!(
                "Update complete: {} applications ({} with devices), {} diagnostics.",
                report.applications, report.applications_with_devices, report.diagnostics
            );
            Ok(())
        }
    }
}
