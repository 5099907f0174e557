//! Downlink plan file
//!
//! The JSON document written by the generator and drained by the transmitter:
//!
//! ```json
//! {"server": [{"address": {"host": "192.168.1.10", "port": 8080},
//!              "credentials": {"username": "apiuser", "password": "..."},
//!              "downlinkSettings": {"fport": 2, "confirmed": true, "flushQueue": true},
//!              "downlinks": {"24E124000000A001": ["01000095", "0a52", ...]}}]}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlinkSettings {
    pub fport: u8,
    pub confirmed: bool,
    pub flush_queue: bool,
}

/// All downlinks for one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlock {
    pub address: Address,
    pub credentials: Credentials,
    pub downlink_settings: DownlinkSettings,
    /// DevEUI -> ordered downlink payloads
    pub downlinks: BTreeMap<String, Vec<String>>,
}

impl ServerBlock {
    pub fn downlink_count(&self) -> usize {
        self.downlinks.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkPlan {
    pub server: Vec<ServerBlock>,
}

impl DownlinkPlan {
    pub fn device_count(&self) -> usize {
        self.server.iter().map(|block| block.downlinks.len()).sum()
    }

    pub fn downlink_count(&self) -> usize {
        self.server.iter().map(ServerBlock::downlink_count).sum()
    }

    /// Serialise the plan as JSON
    ///
    /// # Arguments
    /// * `writer` - Destination
    /// * `indent` - Spaces per nesting level; 0 writes compact JSON
    pub fn to_writer<W: Write>(&self, writer: W, indent: usize) -> Result<()> {
        if indent == 0 {
            serde_json::to_writer(writer, self)?;
        } else {
            let indent = " ".repeat(indent);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
            self.serialize(&mut serializer)?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path, indent: usize) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer, indent)
            .with_context(|| format!("Failed to write downlink plan: {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read downlink plan: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse downlink plan: {}", path.display()))
    }
}
