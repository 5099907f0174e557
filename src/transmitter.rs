//! Downlink transmission
//!
//! Drains a downlink plan into the gateways' device queues, strictly one call
//! at a time. Failed calls are logged and skipped; nothing is retried.

use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::gateway::{ApiResult, DeviceQueueApi, QueueRequest};
use crate::plan::{DownlinkPlan, ServerBlock};

/// Succeeded out of total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub total: usize,
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.total)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub servers: Tally,
    pub devices: Tally,
    pub downlinks: Tally,
}

impl TransmitStats {
    /// Totals taken from the plan, nothing succeeded yet
    pub fn for_plan(plan: &DownlinkPlan) -> Self {
        Self {
            servers: Tally { succeeded: 0, total: plan.server.len() },
            devices: Tally { succeeded: 0, total: plan.device_count() },
            downlinks: Tally { succeeded: 0, total: plan.downlink_count() },
        }
    }

    pub fn log_summary(&self) {
        info!("Successfully processed {} gateways", self.servers);
        info!("Successfully processed {} devices", self.devices);
        info!("Successfully queued {} downlinks", self.downlinks);
    }
}

/// Log an API call's outcome; the value survives only on success
fn log_call<T>(call: &str, device: &str, result: ApiResult<T>) -> Option<T> {
    match result {
        Ok(value) => {
            debug!(call = call, device = device, "API call succeeded");
            Some(value)
        }
        Err(e) => {
            error!(call = call, device = device, error = %e, "API call failed");
            None
        }
    }
}

/// Runs a plan against the gateways
pub struct Transmitter {
    config: ClientConfig,
    /// Prefix for queue snapshot file names
    run_stamp: String,
    stats: TransmitStats,
}

impl Transmitter {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            run_stamp: Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
            stats: TransmitStats::default(),
        }
    }

    pub fn stats(&self) -> &TransmitStats {
        &self.stats
    }

    /// Transmit every server block of `plan`
    ///
    /// A block whose client can't be built is skipped like one whose login fails.
    ///
    /// # Arguments
    /// * `plan` - Downlink plan loaded from the generator's output
    /// * `connect` - Builds the API client for a server block
    pub async fn run<A, F>(&mut self, plan: &DownlinkPlan, mut connect: F) -> TransmitStats
    where
        A: DeviceQueueApi,
        F: FnMut(&ServerBlock) -> Result<A>,
    {
        self.stats = TransmitStats::for_plan(plan);

        for block in &plan.server {
            let server = block.address.to_string();
            let mut api = match connect(block) {
                Ok(api) => api,
                Err(e) => {
                    error!(server = %server, error = %e, "Failed client initialization, skipping server block");
                    continue;
                }
            };

            if self.transmit_block(&mut api, block).await {
                self.stats.servers.succeeded += 1;
                info!(server = %server, "Successfully processed all downlinks");
            }
        }

        self.stats
    }

    /// Log in and transmit every device of one block
    ///
    /// Returns true when every device succeeded.
    pub async fn transmit_block<A: DeviceQueueApi>(&mut self, api: &mut A, block: &ServerBlock) -> bool {
        let server = block.address.to_string();

        if log_call("login", &server, api.login(&block.credentials).await).is_none() {
            error!(server = %server, "Login failed, skipping server block");
            return false;
        }
        info!(server = %server, devices = block.downlinks.len(), "Logged in");

        if self.config.check_devices {
            self.check_devices(&*api, block).await;
        }

        let mut all_ok = true;
        for (dev_eui, downlinks) in &block.downlinks {
            let dev_eui = dev_eui.trim().to_uppercase();
            if self.transmit_device(&*api, block, &dev_eui, downlinks).await {
                self.stats.devices.succeeded += 1;
                info!(server = %server, dev_eui = %dev_eui, "Successfully processed device");
            } else {
                all_ok = false;
            }
        }

        all_ok
    }

    async fn transmit_device<A: DeviceQueueApi>(
        &mut self,
        api: &A,
        block: &ServerBlock,
        dev_eui: &str,
        downlinks: &[String],
    ) -> bool {
        let device = format!("{}/{}", block.address, dev_eui);

        if let Some(dir) = self.config.queue_backup_dir.clone() {
            self.snapshot_queue(api, &dir, dev_eui, "PRE").await;
        }

        if block.downlink_settings.flush_queue {
            match api.flush_queue(dev_eui).await {
                Ok(()) => info!(device = %device, "Flushed (deleted) all queued downlinks"),
                Err(e) => warn!(device = %device, error = %e, "Failed to flush queue"),
            }
        }

        let mut all_queued = true;
        for downlink in downlinks {
            let reference = (self.stats.downlinks.succeeded + 1).to_string();
            let result = match QueueRequest::new(dev_eui, downlink, &block.downlink_settings, reference) {
                Ok(request) => api.queue_downlink(&request).await,
                Err(e) => Err(e),
            };

            if log_call("queue_downlink", &device, result).is_some() {
                self.stats.downlinks.succeeded += 1;
                debug!(device = %device, downlink = %downlink, "Queued downlink");
            } else {
                all_queued = false;
                error!(device = %device, downlink = %downlink, "Failed to add downlink to queue");
            }
        }
        info!(device = %device, "Queued downlinks");

        if let Some(dir) = self.config.queue_backup_dir.clone() {
            self.snapshot_queue(api, &dir, dev_eui, "POST").await;
        }

        all_queued
    }

    /// Warn about plan devices the gateway doesn't list
    async fn check_devices<A: DeviceQueueApi>(&self, api: &A, block: &ServerBlock) {
        let server = block.address.to_string();
        let known = match fetch_device_euis(api, self.config.devices_page_size).await {
            Ok(known) => known,
            Err(e) => {
                warn!(server = %server, error = %e, "Couldn't list gateway devices, skipping device check");
                return;
            }
        };

        for dev_eui in block.downlinks.keys() {
            let dev_eui = dev_eui.trim().to_uppercase();
            if !known.contains(&dev_eui) {
                warn!(server = %server, dev_eui = %dev_eui, "Device is not registered on the gateway");
            }
        }
    }

    async fn snapshot_queue<A: DeviceQueueApi>(&self, api: &A, dir: &Path, dev_eui: &str, phase: &str) {
        let path = snapshot_path(dir, &self.run_stamp, dev_eui, phase);
        let result = match api.get_queue(dev_eui).await {
            Ok(queue) => write_json(&path, &queue),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => info!(dev_eui = dev_eui, path = %path.display(), "Saved queue snapshot"),
            Err(e) => warn!(dev_eui = dev_eui, error = %e, "Failed to save queue snapshot"),
        }
    }
}

/// All upper-cased DevEUIs registered on the gateway
async fn fetch_device_euis<A: DeviceQueueApi>(api: &A, page_size: u32) -> ApiResult<HashSet<String>> {
    let mut known = HashSet::new();
    let mut offset = 0u32;

    loop {
        let page = api.list_devices(page_size, offset).await?;
        let total = page.total_count();
        let fetched = page.result.len();
        known.extend(page.result.into_iter().map(|d| d.dev_eui.trim().to_uppercase()));

        offset = offset.saturating_add(fetched as u32);
        let done = match total {
            Some(total) => u64::from(offset) >= total,
            None => fetched < page_size as usize,
        };
        if fetched == 0 || done {
            break;
        }
    }

    Ok(known)
}

pub fn snapshot_path(dir: &Path, run_stamp: &str, dev_eui: &str, phase: &str) -> PathBuf {
    dir.join(format!("{}--{}--{}.json", run_stamp, dev_eui, phase))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}
