//! Slipway CLI
//!
//! Command-line entry point for the slipway build orchestrator: parses
//! arguments, installs logging and drives one full pipeline run.

mod report;
mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use slipway_core::docker;
use slipway_core::pipeline::BuildPipeline;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(about = "Build and publish s390x artifacts for many repositories", long_about = None)]
struct Cli {
    /// Path to the orchestration configuration file
    config_path: PathBuf,

    /// Only process these repositories (default: all configured)
    repo_names: Vec<String>,

    /// Directory working copies are cloned into
    #[arg(long, env = "SLIPWAY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Directory run logs are written to
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_file = telemetry::init(&cli.log_dir).context("Failed to initialize logging")?;
    info!("Logging to {}", log_file.display());

    let workspace = cli
        .workspace
        .unwrap_or_else(|| std::env::temp_dir().join("slipway"));
    info!(
        "Starting slipway: config={}, workspace={}",
        cli.config_path.display(),
        workspace.display()
    );

    // Builds fail individually without docker; the run itself proceeds.
    if let Err(e) = docker::check_docker_available() {
        warn!("Docker is not available: {}", e);
    }

    let mut pipeline = BuildPipeline::from_config_path(&cli.config_path, &workspace)
        .context("Failed to initialize the build pipeline")?;

    // Artifact failures are isolated inside the run; only fatal errors
    // reach this point and exit non-zero.
    let run = pipeline.run(&cli.repo_names).await?;
    report::print_summary(&run);

    Ok(())
}
