//! Saturated steam pressure/temperature table

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::tables::{is_blank, open_csv, HeaderStyle};

const PRESSURE_COLUMNS: [&str; 3] = ["p-bar", "pressure", "p"];
const TEMPERATURE_COLUMNS: [&str; 4] = ["t-c", "t-celsius", "temperature", "t"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtRow {
    /// Pressure in bar
    pub pressure: f64,
    /// Saturation temperature in °C
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtTable {
    rows: Vec<PtRow>,
}

impl PtTable {
    pub fn new(rows: Vec<PtRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[PtRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row whose pressure is closest to `pressure`
    ///
    /// The table need not be sorted. On ties the row that comes first wins.
    pub fn nearest(&self, pressure: f64) -> Option<&PtRow> {
        let mut best: Option<(&PtRow, f64)> = None;
        for row in &self.rows {
            let distance = (row.pressure - pressure).abs();
            // NaN compares false, so such rows never win
            let closer = match best {
                Some((_, best_distance)) => distance < best_distance,
                None => !distance.is_nan(),
            };
            if closer {
                best = Some((row, distance));
            }
        }
        best.map(|(row, _)| row)
    }

    /// Parse a CSV export of the table
    ///
    /// Pressure and temperature columns are located by header (`P [bar]`,
    /// `T [°C]`); other unit columns are ignored.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let mut reader = open_csv(reader, 0, HeaderStyle::KeepUnits)?;
        let headers = reader.headers()?.clone();

        let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h));
        let p_idx = find(&PRESSURE_COLUMNS[..]).context("P-T table has no pressure [bar] column")?;
        let t_idx = find(&TEMPERATURE_COLUMNS[..]).context("P-T table has no temperature [°C] column")?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read P-T table row")?;
            if is_blank(&record) {
                continue;
            }
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let cell = |idx: usize| -> Result<f64> {
                let raw = record.get(idx).unwrap_or_default();
                let value = raw
                    .parse::<f64>()
                    .with_context(|| format!("Invalid number '{}' at line {}", raw, line))?;
                if !value.is_finite() {
                    anyhow::bail!("Non-finite value '{}' at line {}", raw, line);
                }
                Ok(value)
            };
            rows.push(PtRow {
                pressure: cell(p_idx)?,
                temperature: cell(t_idx)?,
            });
        }

        if rows.is_empty() {
            anyhow::bail!("P-T table is empty");
        }

        Ok(Self::new(rows))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open P-T table: {}", path.display()))?;
        Self::read(file).with_context(|| format!("Failed to parse P-T table: {}", path.display()))
    }
}
