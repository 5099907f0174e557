//! Downlink generation
//!
//! Matches every device row against the decision table, encodes its
//! configuration downlinks and collects them into a plan grouped by gateway.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::aggregator::BlockDefaults;
use crate::config::{resolve_with_fallback, GeneratorConfig};
use crate::encoder::{self, EncodeSettings};
use crate::matcher::match_device;
use crate::plan::DownlinkPlan;
use crate::pt_table::PtTable;
use crate::tables::{self, DecisionRow, DeviceSpec, DeviceTable};

/// Per-device outcome counts of one generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub devices: usize,
    pub generated: usize,
    /// No decision row for the device
    pub unmatched: usize,
    /// Encoding failed
    pub failed: usize,
    /// Undecodable row, bad server address or bad DevEUI
    pub rejected: usize,
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} devices generated ({} unmatched, {} failed, {} rejected)",
            self.generated, self.devices, self.unmatched, self.failed, self.rejected
        )
    }
}

/// Lookup tables and settings shared by every device of a run
pub struct Generator<'a> {
    decision_table: &'a [DecisionRow],
    pt_table: &'a PtTable,
    settings: EncodeSettings,
    defaults: BlockDefaults,
}

impl<'a> Generator<'a> {
    pub fn new(
        decision_table: &'a [DecisionRow],
        pt_table: &'a PtTable,
        settings: EncodeSettings,
        defaults: BlockDefaults,
    ) -> Self {
        Self {
            decision_table,
            pt_table,
            settings,
            defaults,
        }
    }

    /// Build the plan for all devices, in table order
    pub fn generate(&self, devices: &[DeviceSpec]) -> (DownlinkPlan, GenerationReport) {
        let mut plan = DownlinkPlan::default();
        let mut report = GenerationReport {
            devices: devices.len(),
            ..Default::default()
        };

        for (idx, device) in devices.iter().enumerate() {
            debug!(row = idx, dev_eui = %device.deveui, "Processing device");

            let row = match match_device(device, self.decision_table) {
                Ok(row) => row,
                Err(reason) => {
                    warn!(
                        server = %device.server,
                        dev_eui = %device.deveui,
                        reason = %reason,
                        "No decision row for device, skipping"
                    );
                    report.unmatched += 1;
                    continue;
                }
            };
            debug!(
                dev_eui = %device.deveui,
                index = ?row.index,
                p_min = row.p_min,
                p_max = row.p_max,
                pressure = device.differential_pressure,
                "Matched decision row"
            );

            let downlinks = match encoder::encode(
                row,
                self.pt_table,
                device.differential_pressure,
                device.dn,
                self.settings,
            ) {
                Ok(downlinks) => downlinks,
                Err(e) => {
                    error!(server = %device.server, dev_eui = %device.deveui, error = %e, "Failed to encode downlinks");
                    report.failed += 1;
                    continue;
                }
            };

            match plan.insert(&device.server, &device.deveui, downlinks, &self.defaults) {
                Ok(_) => report.generated += 1,
                Err(e) => {
                    warn!(server = %device.server, dev_eui = %device.deveui, error = %e, "Skipping device");
                    report.rejected += 1;
                }
            }
        }

        (plan, report)
    }

    /// Like [`generate`](Self::generate), counting the table's skipped rows as rejected
    pub fn generate_table(&self, table: &DeviceTable) -> (DownlinkPlan, GenerationReport) {
        let (plan, mut report) = self.generate(&table.devices);
        report.devices += table.skipped.len();
        report.rejected += table.skipped.len();
        (plan, report)
    }
}

fn load_devices(config: &GeneratorConfig) -> Result<DeviceTable> {
    let input = &config.input;
    let (path, is_template) = resolve_with_fallback(&input.path, input.template.as_deref())
        .with_context(|| format!("Device table not found: {}", input.path.display()))?;

    if is_template {
        warn!(
            input = %input.path.display(),
            template = %path.display(),
            "Device table not found, using the template instead"
        );
    }

    tables::load_device_specs(&path, input.skip_rows)
}

/// Generate the downlink plan described by `config` and write it to disk
pub fn run(config: &GeneratorConfig) -> Result<GenerationReport> {
    let decision_table = tables::load_decision_table(&config.lookup.decision_table, config.lookup.decision_skip_rows)?;
    let pt_table = PtTable::load(&config.lookup.pt_table)?;
    info!(
        decision_rows = decision_table.len(),
        pt_rows = pt_table.len(),
        "Loaded lookup tables"
    );

    let devices = load_devices(config)?;
    info!(
        devices = devices.devices.len(),
        skipped = devices.skipped.len(),
        "Loaded device table"
    );

    let generator = Generator::new(&decision_table, &pt_table, config.encode_settings(), config.block_defaults());
    let (plan, report) = generator.generate_table(&devices);

    plan.save(&config.output.path, config.output.indent)?;
    info!(
        path = %config.output.path.display(),
        servers = plan.server.len(),
        devices = plan.device_count(),
        downlinks = plan.downlink_count(),
        "Wrote downlink plan"
    );
    info!("{}", report);

    Ok(report)
}
