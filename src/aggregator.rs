//! Groups generated downlinks by gateway and device

use thiserror::Error;
use tracing::{debug, warn};

use crate::plan::{Address, Credentials, DownlinkPlan, DownlinkSettings, ServerBlock};

/// HTTPS port of the UG6x gateway's local API
pub const LOCAL_GATEWAY_PORT: u16 = 8080;

/// Port for servers that are not a known local gateway
pub const FALLBACK_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Empty server address")]
    EmptyAddress,

    #[error("Server address has too many ':' separated parts: '{0}'")]
    TooManyParts(String),

    #[error("Invalid port number in server address: '{0}'")]
    InvalidPort(String),

    #[error("DevEUI must be 16 hex digits: '{0}'")]
    InvalidDevEui(String),
}

/// Port used when a server address doesn't carry one
pub fn default_port(gateway_kind: &str) -> u16 {
    if gateway_kind.trim().eq_ignore_ascii_case("ug6x") {
        LOCAL_GATEWAY_PORT
    } else {
        FALLBACK_PORT
    }
}

/// Parse a server cell into host and port
///
/// Supports:
/// - 192.168.1.10
/// - 192.168.1.10:8080
/// - https://gateway.local:8080/
pub fn parse_server_address(raw: &str, default_port: u16) -> Result<Address, PlanError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if without_scheme.is_empty() {
        return Err(PlanError::EmptyAddress);
    }

    let parts: Vec<&str> = without_scheme.split(':').collect();
    match parts.as_slice() {
        [host] => Ok(Address {
            host: host.to_string(),
            port: default_port,
        }),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| PlanError::InvalidPort(trimmed.to_string()))?;
            Ok(Address {
                host: host.to_string(),
                port,
            })
        }
        [_, _] => Err(PlanError::EmptyAddress),
        _ => Err(PlanError::TooManyParts(trimmed.to_string())),
    }
}

pub fn is_valid_dev_eui(dev_eui: &str) -> bool {
    matches!(hex::decode(dev_eui), Ok(bytes) if bytes.len() == 8)
}

/// Values given to every newly created server block
#[derive(Debug, Clone)]
pub struct BlockDefaults {
    pub port: u16,
    pub credentials: Credentials,
    pub downlink_settings: DownlinkSettings,
}

/// What `insert` did with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    NewServer,
    Appended,
    /// The DevEUI was already present for this server and has been overwritten
    Replaced,
}

impl DownlinkPlan {
    /// Add one device's downlinks, creating the server block on first use
    ///
    /// # Arguments
    /// * `server` - Raw server cell (e.g., "192.168.1.10", "https://gw:8080/")
    /// * `dev_eui` - 16 hex digit device identifier
    /// * `downlinks` - Encoded commands, in sending order
    /// * `defaults` - Port, credentials and settings for a new block
    pub fn insert(
        &mut self,
        server: &str,
        dev_eui: &str,
        downlinks: Vec<String>,
        defaults: &BlockDefaults,
    ) -> Result<Insertion, PlanError> {
        let dev_eui = dev_eui.trim();
        if !is_valid_dev_eui(dev_eui) {
            return Err(PlanError::InvalidDevEui(dev_eui.to_string()));
        }
        let address = parse_server_address(server, defaults.port)?;

        if let Some(block) = self.server.iter_mut().find(|block| block.address == address) {
            let previous = block.downlinks.insert(dev_eui.to_string(), downlinks);
            return Ok(if previous.is_some() {
                warn!(server = %address, dev_eui = dev_eui, "Device listed twice, keeping the last row");
                Insertion::Replaced
            } else {
                debug!(server = %address, dev_eui = dev_eui, "Adding device to existing server block");
                Insertion::Appended
            });
        }

        debug!(server = %address, dev_eui = dev_eui, "Creating server block");
        let mut block = ServerBlock {
            address,
            credentials: defaults.credentials.clone(),
            downlink_settings: defaults.downlink_settings,
            downlinks: Default::default(),
        };
        block.downlinks.insert(dev_eui.to_string(), downlinks);
        self.server.push(block);

        Ok(Insertion::NewServer)
    }
}
