//! Configuration management for the generator and the transmitter
//!
//! Each stage loads its own TOML file. Environment variables override the
//! gateway credentials written into generated plans.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregator::{self, BlockDefaults};
use crate::encoder::EncodeSettings;
use crate::plan::{Credentials, DownlinkSettings};

/// Largest fport available to applications (224+ are reserved)
const MAX_FPORT: u8 = 223;

/// The uplink period shares its 4-byte command with a 1-byte opcode
const MAX_UPLINK_FREQUENCY: u32 = 0x00ff_ffff;

/// Downlink generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub lookup: LookupConfig,
    pub input: GeneratorInputConfig,
    pub output: OutputConfig,
    pub gateway: GatewayConfig,
    pub downlinks: DownlinkConfig,
}

/// Downlink transmitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub input: TransmitterInputConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Console {
    Stdout,
    Stderr,
    None,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG isn't set
    pub level: String,
    pub console: Console,
    /// Directory for per-run log files; no file log when unset
    pub logs_dir: Option<PathBuf>,
    /// chrono format string for the log file name
    pub filename_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: Console::Stderr,
            logs_dir: Some(PathBuf::from("logs")),
            filename_format: "%Y-%m-%d_%H-%M-%S".to_string(),
        }
    }
}

/// Decision and pressure-temperature tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    pub decision_table: PathBuf,
    pub pt_table: PathBuf,
    /// Title rows above the decision table header
    #[serde(default = "default_decision_skip_rows")]
    pub decision_skip_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorInputConfig {
    /// Device specification table
    pub path: PathBuf,
    #[serde(default)]
    pub skip_rows: usize,
    /// Used with a warning when `path` doesn't exist
    pub template: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default = "default_indent")]
    pub indent: usize,
}

/// Gateway kind and API credentials written into each server block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// `ug6x` selects the local gateway API port as default
    pub kind: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownlinkConfig {
    pub fport: u8,
    pub confirmed: bool,
    pub flush_queue: bool,
    pub reset_error_counters: bool,
    /// Steady-state uplink period in seconds
    pub uplink_frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterInputConfig {
    /// Downlink plan written by the generator
    pub path: PathBuf,
    /// Used with a warning when `path` doesn't exist
    pub example: Option<PathBuf>,
}

/// Gateway HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Accept self-signed gateway certificates
    pub insecure: bool,
    /// Warn about plan devices the gateway doesn't know
    pub check_devices: bool,
    pub devices_page_size: u32,
    /// Save device queues before and after queueing when set
    pub queue_backup_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            insecure: true,
            check_devices: false,
            devices_page_size: 1000,
            queue_backup_dir: None,
        }
    }
}

fn default_decision_skip_rows() -> usize {
    1
}

fn default_indent() -> usize {
    4
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// `path` if it exists, otherwise the `fallback` when that exists
///
/// The flag is true when the fallback was chosen.
pub fn resolve_with_fallback(path: &Path, fallback: Option<&Path>) -> Option<(PathBuf, bool)> {
    if path.is_file() {
        return Some((path.to_path_buf(), false));
    }
    fallback
        .filter(|fallback| fallback.is_file())
        .map(|fallback| (fallback.to_path_buf(), true))
}

impl GeneratorConfig {
    /// Load configuration from file
    ///
    /// Environment variables override config file values:
    /// - GATEWAY_USERNAME: Override gateway API username
    /// - GATEWAY_PASSWORD: Override gateway API password
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GeneratorConfig = read_toml(path)?;

        if let Ok(username) = std::env::var("GATEWAY_USERNAME") {
            tracing::info!("Using GATEWAY_USERNAME from environment");
            config.gateway.username = username;
        }
        if let Ok(password) = std::env::var("GATEWAY_PASSWORD") {
            tracing::info!("Using GATEWAY_PASSWORD from environment");
            config.gateway.password = password;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.gateway.kind.trim().is_empty() {
            anyhow::bail!("Gateway kind must not be empty");
        }

        if self.downlinks.fport == 0 || self.downlinks.fport > MAX_FPORT {
            anyhow::bail!("Invalid fport: {} (must be 1..={})", self.downlinks.fport, MAX_FPORT);
        }

        if self.downlinks.uplink_frequency == 0 || self.downlinks.uplink_frequency > MAX_UPLINK_FREQUENCY {
            anyhow::bail!(
                "Invalid uplink_frequency: {} (must be 1..={})",
                self.downlinks.uplink_frequency,
                MAX_UPLINK_FREQUENCY
            );
        }

        if self.output.indent > 16 {
            anyhow::bail!("Output indent {} is too large (max 16)", self.output.indent);
        }

        Ok(())
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            reset_counters: self.downlinks.reset_error_counters,
            uplink_frequency: self.downlinks.uplink_frequency,
        }
    }

    pub fn block_defaults(&self) -> BlockDefaults {
        BlockDefaults {
            port: aggregator::default_port(&self.gateway.kind),
            credentials: Credentials {
                username: self.gateway.username.trim().to_string(),
                password: self.gateway.password.trim().to_string(),
            },
            downlink_settings: DownlinkSettings {
                fport: self.downlinks.fport,
                confirmed: self.downlinks.confirmed,
                flush_queue: self.downlinks.flush_queue,
            },
        }
    }
}

impl TransmitterConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let config: TransmitterConfig = read_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client.timeout_secs == 0 {
            anyhow::bail!("Client timeout_secs must be greater than 0");
        }

        if self.client.devices_page_size == 0 {
            anyhow::bail!("Client devices_page_size must be greater than 0");
        }

        Ok(())
    }
}
