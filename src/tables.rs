//! Input tables
//!
//! Loads the decision table and the per-device specification table from CSV
//! exports of the configuration workbooks. Header cells are normalised before
//! rows are deserialised, so `Steam Trap Type` and `steam-trap-type` address
//! the same column and unit annotations like `[bar]` are ignored.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::categories::{Label, MountingType, SteamTrapType};

/// One physical device to configure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceSpec {
    pub deveui: String,
    pub server: String,
    pub steam_trap_type: SteamTrapType,
    pub mounting_type: MountingType,
    pub hardware_model: Label,
    /// Nominal pipe size in mm
    pub dn: u32,
    /// Differential pressure in bar
    pub differential_pressure: f64,
    #[serde(default)]
    pub application: Option<String>,
    pub condensate_load: Label,
}

/// One row of the static decision table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DecisionRow {
    #[serde(default)]
    pub index: Option<u32>,
    pub steam_trap_type: SteamTrapType,
    pub mounting_type: MountingType,
    pub hardware_model: Label,
    pub condensate_load: Label,
    pub p_min: f64,
    pub p_max: f64,
    /// Noise threshold TV
    pub tv: u32,
    /// Noise threshold LV
    pub lv: u32,
    pub slth0: u32,
    pub slval0: u32,
    pub slth1: u32,
    pub slval1: u32,
    pub slth2: u32,
    pub slval2: u32,
}

pub const DEVICE_COLUMNS: [&str; 9] = [
    "deveui",
    "server",
    "steam-trap-type",
    "mounting-type",
    "hardware-model",
    "dn",
    "differential-pressure",
    "application",
    "condensate-load",
];

/// How unit annotations and digits in a header cell are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `p-min [bar]` -> `p-min`
    DropUnits,
    /// Like `DropUnits`, digits removed too: `DN (mm)` -> `dn`
    DropUnitsAndDigits,
    /// `P [bar]` -> `p-bar`
    KeepUnits,
}

/// Normalise a header cell to a lower-case, dash-separated column key
pub fn normalize_header(raw: &str, style: HeaderStyle) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;

    for c in raw.trim().to_lowercase().chars() {
        match c {
            '[' | '(' | '{' | '<' => {
                depth += 1;
                if style == HeaderStyle::KeepUnits {
                    out.push('-');
                }
            }
            ']' | ')' | '}' | '>' => depth = depth.saturating_sub(1),
            _ if depth > 0 && style != HeaderStyle::KeepUnits => {}
            ' ' | '-' => out.push('-'),
            'a'..='z' => out.push(c),
            '0'..='9' if style != HeaderStyle::DropUnitsAndDigits => out.push(c),
            _ => {}
        }
    }

    out.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// CSV reader positioned after `skip_rows` leading lines, with normalised headers
pub(crate) fn open_csv<R: Read>(
    reader: R,
    skip_rows: usize,
    style: HeaderStyle,
) -> Result<csv::Reader<BufReader<R>>> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    for _ in 0..skip_rows {
        line.clear();
        reader.read_line(&mut line).context("Failed to skip leading rows")?;
    }

    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: StringRecord = csv_reader
        .headers()
        .context("Failed to read table header")?
        .iter()
        .map(|h| normalize_header(h, style))
        .collect();
    csv_reader.set_headers(headers);

    Ok(csv_reader)
}

pub(crate) fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.is_empty())
}

/// Deserialise every non-blank row; line numbers are reported on failure
fn read_rows<T: DeserializeOwned, R: Read>(mut reader: csv::Reader<BufReader<R>>) -> Result<Vec<T>> {
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record.context("Failed to read table row")?;
        if is_blank(&record) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row = record
            .deserialize(Some(&headers))
            .with_context(|| format!("Invalid row at line {}", line))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load the decision table
pub fn read_decision_table<R: Read>(reader: R, skip_rows: usize) -> Result<Vec<DecisionRow>> {
    let reader = open_csv(reader, skip_rows, HeaderStyle::DropUnits)?;
    let rows: Vec<DecisionRow> = read_rows(reader)?;

    for row in &rows {
        if !row.p_min.is_finite() || !row.p_max.is_finite() {
            anyhow::bail!(
                "Decision row {:?} has a non-finite pressure window [{}, {}]",
                row.index,
                row.p_min,
                row.p_max
            );
        }
        if row.p_min > row.p_max {
            anyhow::bail!(
                "Decision row {:?} has p-min {} greater than p-max {}",
                row.index,
                row.p_min,
                row.p_max
            );
        }
    }

    Ok(rows)
}

/// Device row left out because it couldn't be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub dev_eui: String,
    pub reason: String,
}

/// Decoded device rows plus the ones that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceTable {
    pub devices: Vec<DeviceSpec>,
    pub skipped: Vec<SkippedRow>,
}

/// Load the device specification table
///
/// A missing required column fails the whole table. A row that doesn't decode
/// (unknown category, bad number) is logged and skipped. Columns outside the
/// expected set are logged and ignored.
pub fn read_device_specs<R: Read>(reader: R, skip_rows: usize) -> Result<DeviceTable> {
    let mut reader = open_csv(reader, skip_rows, HeaderStyle::DropUnitsAndDigits)?;
    let headers = reader.headers()?.clone();

    for column in headers.iter() {
        if !DEVICE_COLUMNS.contains(&column) {
            debug!(column = column, "Ignoring unexpected device table column");
        }
    }
    let missing: Vec<&str> = DEVICE_COLUMNS
        .iter()
        .copied()
        .filter(|&column| column != "application" && !headers.iter().any(|h| h == column))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("Device table is missing columns: {}", missing.join(", "));
    }
    let dev_eui_idx = headers.iter().position(|h| h == "deveui");

    let mut table = DeviceTable::default();
    for record in reader.records() {
        let record = record.context("Failed to read table row")?;
        if is_blank(&record) {
            continue;
        }
        match record.deserialize::<DeviceSpec>(Some(&headers)) {
            Ok(device) => table.devices.push(device),
            Err(e) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let dev_eui = dev_eui_idx
                    .and_then(|idx| record.get(idx))
                    .unwrap_or_default()
                    .to_string();
                warn!(line = line, dev_eui = %dev_eui, error = %e, "Skipping undecodable device row");
                table.skipped.push(SkippedRow {
                    line,
                    dev_eui,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(table)
}

pub fn load_decision_table(path: &Path, skip_rows: usize) -> Result<Vec<DecisionRow>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open decision table: {}", path.display()))?;
    read_decision_table(file, skip_rows)
        .with_context(|| format!("Failed to parse decision table: {}", path.display()))
}

pub fn load_device_specs(path: &Path, skip_rows: usize) -> Result<DeviceTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open device table: {}", path.display()))?;
    read_device_specs(file, skip_rows)
        .with_context(|| format!("Failed to parse device table: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECISION_CSV: &str = "\
MSB configuration parameters,,,,,,,,,,,,,,
Index,Steam Trap Type,Mounting Type,Hardware Model,Condensate Load,P-Min [bar],P-Max [bar],TV,LV,SLTh0,SLVal0,SLTh1,SLVal1,SLTh2,SLVal2
0,bimetallic,PBS,MSB-1,low,0,10,12,6,20,2,40,4,60,8
1,ball-float,ADP,MSB-1,high,0,32,10,5,20,3,40,5,60,7
,,,,,,,,,,,,,,
";

    const DEVICE_CSV: &str = "\
DevEUI,Server,Steam Trap Type,Mounting Type,Hardware Model,DN (mm),Differential Pressure [bar],Application,Condensate Load,Comment
24E124000000A001,192.168.1.10,ball-float,ADP,MSB-1,50,4.5,heating,high,first floor
";

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Steam Trap Type ", HeaderStyle::DropUnits), "steam-trap-type");
        assert_eq!(normalize_header("P-Min [bar]", HeaderStyle::DropUnits), "p-min");
        assert_eq!(normalize_header("SLTh0", HeaderStyle::DropUnits), "slth0");
        assert_eq!(normalize_header("DN (mm)", HeaderStyle::DropUnitsAndDigits), "dn");
        assert_eq!(
            normalize_header("Differential Pressure [bar]", HeaderStyle::DropUnitsAndDigits),
            "differential-pressure"
        );
        assert_eq!(normalize_header("P [bar]", HeaderStyle::KeepUnits), "p-bar");
        assert_eq!(normalize_header("T [°C]", HeaderStyle::KeepUnits), "t-c");
        assert_eq!(normalize_header("T [°F]", HeaderStyle::KeepUnits), "t-f");
    }

    #[test]
    fn test_read_decision_table() {
        let rows = read_decision_table(DECISION_CSV.as_bytes(), 1).unwrap();
        assert_eq!(rows.len(), 2);

        let una = &rows[1];
        assert_eq!(una.index, Some(1));
        assert_eq!(una.steam_trap_type, SteamTrapType::UNA);
        assert_eq!(una.mounting_type, MountingType::ADP);
        assert_eq!(una.hardware_model, Label::new("msb-1"));
        assert_eq!(una.p_max, 32.0);
        assert_eq!((una.tv, una.lv, una.slval0), (10, 5, 3));
    }

    #[test]
    fn test_read_decision_table_rejects_inverted_window() {
        let csv = "index,steam-trap-type,mounting-type,hardware-model,condensate-load,p-min,p-max,tv,lv,slth0,slval0,slth1,slval1,slth2,slval2\n\
                   0,BK,PBS,MSB-1,low,10,5,1,1,1,1,1,1,1,1\n";
        assert!(read_decision_table(csv.as_bytes(), 0).is_err());
    }

    #[test]
    fn test_read_decision_table_rejects_nan_window() {
        let csv = "index,steam-trap-type,mounting-type,hardware-model,condensate-load,p-min,p-max,tv,lv,slth0,slval0,slth1,slval1,slth2,slval2\n\
                   0,BK,PBS,MSB-1,low,0,NaN,1,1,1,1,1,1,1,1\n";
        let err = read_decision_table(csv.as_bytes(), 0).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_read_device_specs_drops_unknown_columns() {
        let table = read_device_specs(DEVICE_CSV.as_bytes(), 0).unwrap();
        assert_eq!(table.devices.len(), 1);
        assert!(table.skipped.is_empty());

        let device = &table.devices[0];
        assert_eq!(device.deveui, "24E124000000A001");
        assert_eq!(device.steam_trap_type, SteamTrapType::UNA);
        assert_eq!(device.dn, 50);
        assert_eq!(device.differential_pressure, 4.5);
        assert_eq!(device.application.as_deref(), Some("heating"));
    }

    #[test]
    fn test_read_device_specs_skips_bad_category() {
        let csv = "deveui,server,steam-trap-type,mounting-type,hardware-model,dn,differential-pressure,condensate-load\n\
                   24E124000000A001,gw,bimetallic,PBS,MSB-1,50,4.5,low\n\
                   24E124000000A002,gw,bucket,PBS,MSB-1,50,4.5,low\n";
        let table = read_device_specs(csv.as_bytes(), 0).unwrap();

        assert_eq!(table.devices.len(), 1);
        assert_eq!(table.devices[0].deveui, "24E124000000A001");
        assert_eq!(table.skipped.len(), 1);

        let skipped = &table.skipped[0];
        assert_eq!(skipped.line, 3);
        assert_eq!(skipped.dev_eui, "24E124000000A002");
        assert!(skipped.reason.contains("Unknown steam-trap type"));
    }

    #[test]
    fn test_read_device_specs_requires_columns() {
        let csv = "deveui,server,steam-trap-type,hardware-model,dn,differential-pressure,condensate-load\n\
                   24E124000000A001,gw,bimetallic,MSB-1,50,4.5,low\n";
        let err = read_device_specs(csv.as_bytes(), 0).unwrap_err();
        assert_eq!(err.to_string(), "Device table is missing columns: mounting-type");
    }
}
