//! Steam-trap downlink configurator
//!
//! Two stages connected by a JSON plan file:
//! - `generate` matches device rows against the decision table and writes the plan
//! - `transmit` logs into each gateway and queues the planned downlinks
//!
//! Architecture: device table → matcher → encoder → plan file → gateway API

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use steamtrap_downlinks::config::{resolve_with_fallback, GeneratorConfig, TransmitterConfig};
use steamtrap_downlinks::gateway::GatewayClient;
use steamtrap_downlinks::generator;
use steamtrap_downlinks::logging;
use steamtrap_downlinks::plan::DownlinkPlan;
use steamtrap_downlinks::transmitter::Transmitter;

#[derive(Parser)]
#[command(name = "steamtrap-downlinks", version, about = "Configure LoRaWAN steam-trap sensors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the downlink plan from the device table
    Generate {
        #[arg(short, long, default_value = "generator.toml")]
        config: PathBuf,
    },
    /// Queue the downlinks of a plan on the gateways
    Transmit {
        #[arg(short, long, default_value = "transmitter.toml")]
        config: PathBuf,
        /// Plan file, overrides `[input] path`
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

/// `generator.toml` -> `generator.example.toml`
fn example_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");
    path.with_file_name(format!("{}.example.toml", stem))
}

/// Config path to load, falling back to the example next to it
///
/// Runs before logging is set up, so the fallback warning goes to stderr.
fn locate_config(path: &Path) -> Result<PathBuf> {
    let example = example_path(path);
    let (found, is_example) = resolve_with_fallback(path, Some(example.as_path()))
        .with_context(|| format!("Missing configuration file: {}", path.display()))?;
    if is_example {
        eprintln!(
            "warning: {} not found, using {}",
            path.display(),
            found.display()
        );
    }
    Ok(found)
}

fn generate(config_path: &Path) -> Result<()> {
    let config = GeneratorConfig::load(config_path)?;
    if let Some(log_file) = logging::init(&config.logging)? {
        info!(path = %log_file.display(), "Logging to file");
    }
    info!(config = %config_path.display(), "Downlink generator starting");

    generator::run(&config)?;

    info!("Downlink generator finished");
    Ok(())
}

async fn transmit(config_path: &Path, input: Option<PathBuf>) -> Result<()> {
    let mut config = TransmitterConfig::load(config_path)?;
    if let Some(input) = input {
        config.input.path = input;
    }
    if let Some(log_file) = logging::init(&config.logging)? {
        info!(path = %log_file.display(), "Logging to file");
    }
    info!(config = %config_path.display(), "Downlink transmitter starting");

    let (plan_path, is_example) = resolve_with_fallback(&config.input.path, config.input.example.as_deref())
        .with_context(|| format!("Downlink plan not found: {}", config.input.path.display()))?;
    if is_example {
        warn!(
            input = %config.input.path.display(),
            example = %plan_path.display(),
            "Downlink plan not found, using the example instead"
        );
    }

    let plan = DownlinkPlan::load(&plan_path)?;
    info!(
        path = %plan_path.display(),
        servers = plan.server.len(),
        devices = plan.device_count(),
        downlinks = plan.downlink_count(),
        "Loaded downlink plan"
    );

    let client_config = config.client.clone();
    let mut transmitter = Transmitter::new(config.client);
    let stats = transmitter
        .run(&plan, |block| GatewayClient::new(&block.address, &client_config))
        .await;
    stats.log_summary();

    info!("Downlink transmitter finished");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate { config } => generate(&locate_config(&config)?),
        Command::Transmit { config, input } => transmit(&locate_config(&config)?, input).await,
    }
}
