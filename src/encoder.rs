//! Downlink payload encoding
//!
//! Turns a matched decision row into the ordered list of configuration
//! commands understood by the steam-trap sensor firmware. Each command is a
//! lower-case hex string; the device applies them in arrival order, so the
//! sequence below must not be reordered.

use thiserror::Error;

use crate::categories::SteamTrapType;
use crate::pt_table::PtTable;
use crate::tables::DecisionRow;

/// Opcode for the uplink sample period, OR'd with the period value
pub const UPLINK_PERIOD_OPCODE: u32 = 0x0100_0000;

/// Sample period used while the configuration is applied (ceil(1.4828 / 0.01))
pub const FAST_UPLINK_PERIOD: u32 = 149;

/// Default warning counter threshold
pub const WARN_COUNT_THRESHOLD: u64 = 36;

/// Default error counter threshold
pub const ERROR_COUNT_THRESHOLD: u64 = 72;

pub const RESET_COUNTERS: &str = "04fc";

/// Steam-loss values of band 0 are scaled for large ball-float traps
pub const BALL_FLOAT_CORRECTION: u64 = 4;
pub const BALL_FLOAT_MIN_DN: u32 = 40;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("value {value:#x} needs {digits} hex digits but only {width} are available")]
    Overflow { value: u64, digits: usize, width: usize },

    #[error("saturation temperature {0} °C can't be encoded")]
    InvalidTemperature(f64),

    #[error("pressure-temperature table is empty")]
    EmptyPtTable,
}

/// Render `value` as lower-case hex, zero-padded to `width` digits
///
/// Without a width the natural digit count is rounded up to a whole byte.
pub fn tohex(value: u64, width: Option<usize>) -> Result<String, EncodeError> {
    let natural = format!("{:x}", value);
    let digits = natural.len();

    let width = match width {
        None => digits + digits % 2,
        Some(width) if digits > width => {
            return Err(EncodeError::Overflow { value, digits, width });
        }
        Some(width) => width,
    };

    Ok(format!("{:0width$x}", value, width = width))
}

/// Correction factor for the band-0 steam-loss value
pub fn steam_loss_correction(trap: SteamTrapType, dn: u32) -> u64 {
    if trap == SteamTrapType::UNA && dn >= BALL_FLOAT_MIN_DN {
        BALL_FLOAT_CORRECTION
    } else {
        1
    }
}

/// Settings that are the same for every device of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub reset_counters: bool,
    /// Steady-state uplink period restored by the last command
    pub uplink_frequency: u32,
}

/// Build the ordered configuration downlinks for one device
///
/// Returns 14 commands, or 15 when counters are reset.
///
/// # Arguments
/// * `row` - Decision row matched for the device
/// * `pt_table` - Saturation table used for the temperature command
/// * `pressure` - Device differential pressure in bar
/// * `pipe_size` - Nominal pipe size DN in mm
/// * `settings` - Counter reset flag and steady-state uplink period
pub fn encode(
    row: &DecisionRow,
    pt_table: &PtTable,
    pressure: f64,
    pipe_size: u32,
    settings: EncodeSettings,
) -> Result<Vec<String>, EncodeError> {
    let trap = row.steam_trap_type.code();
    let mut downlinks = Vec::with_capacity(15);

    // speed up the configuration process
    downlinks.push(tohex(u64::from(UPLINK_PERIOD_OPCODE | FAST_UPLINK_PERIOD), Some(8))?);

    downlinks.push(format!("0a5{:x}", trap));

    let saturation = pt_table.nearest(pressure).ok_or(EncodeError::EmptyPtTable)?;
    downlinks.push(format!("82{}", tohex(temperature_byte(saturation.temperature)?, Some(2))?));

    // noise thresholds
    downlinks.push(format!("830{:x}00{}", trap, tohex(row.tv.into(), Some(2))?));
    downlinks.push(format!("830{:x}01{}", trap, tohex(row.lv.into(), Some(2))?));

    // steam-loss thresholds and values
    let correction = steam_loss_correction(row.steam_trap_type, pipe_size);
    let steam_loss = [
        u64::from(row.slth0),
        u64::from(row.slval0) * correction,
        u64::from(row.slth1),
        u64::from(row.slval1),
        u64::from(row.slth2),
        u64::from(row.slval2),
    ];
    for (sub_index, value) in steam_loss.into_iter().enumerate() {
        downlinks.push(format!("8d0{:x}{:02x}{}", trap, sub_index, tohex(value, Some(2))?));
    }

    // counter thresholds
    downlinks.push(format!("8402{}", tohex(WARN_COUNT_THRESHOLD, Some(4))?));
    downlinks.push(format!("8502{}", tohex(ERROR_COUNT_THRESHOLD, Some(4))?));

    if settings.reset_counters {
        downlinks.push(RESET_COUNTERS.to_string());
    }

    downlinks.push(format!(
        "{:02x}{}",
        UPLINK_PERIOD_OPCODE >> 24,
        tohex(settings.uplink_frequency.into(), Some(6))?
    ));

    Ok(downlinks)
}

fn temperature_byte(temperature: f64) -> Result<u64, EncodeError> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(EncodeError::InvalidTemperature(temperature));
    }
    Ok(temperature.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{Label, MountingType};
    use crate::pt_table::PtRow;

    fn decision_row(trap: SteamTrapType) -> DecisionRow {
        DecisionRow {
            index: Some(0),
            steam_trap_type: trap,
            mounting_type: MountingType::ADP,
            hardware_model: Label::new("MSB-1"),
            condensate_load: Label::new("high"),
            p_min: 0.0,
            p_max: 32.0,
            tv: 10,
            lv: 5,
            slth0: 20,
            slval0: 3,
            slth1: 40,
            slval1: 5,
            slth2: 60,
            slval2: 7,
        }
    }

    fn pt_table() -> PtTable {
        PtTable::new(vec![
            PtRow { pressure: 1.0, temperature: 99.6 },
            PtRow { pressure: 4.0, temperature: 143.6 },
            PtRow { pressure: 5.0, temperature: 151.8 },
        ])
    }

    fn settings(reset_counters: bool) -> EncodeSettings {
        EncodeSettings {
            reset_counters,
            uplink_frequency: 900,
        }
    }

    #[test]
    fn test_tohex() {
        assert_eq!(tohex(0, None).unwrap(), "00");
        assert_eq!(tohex(255, None).unwrap(), "ff");
        assert_eq!(tohex(256, None).unwrap(), "0100");
        assert_eq!(tohex(10, Some(2)).unwrap(), "0a");
        assert_eq!(tohex(36, Some(4)).unwrap(), "0024");
        assert_eq!(tohex(0x0100_0095, Some(8)).unwrap(), "01000095");
    }

    #[test]
    fn test_tohex_overflow() {
        assert_eq!(
            tohex(256, Some(2)),
            Err(EncodeError::Overflow {
                value: 256,
                digits: 3,
                width: 2
            })
        );
    }

    #[test]
    fn test_encode_ball_float() {
        let downlinks = encode(&decision_row(SteamTrapType::UNA), &pt_table(), 4.5, 50, settings(false)).unwrap();
        assert_eq!(
            downlinks,
            vec![
                "01000095", // fast uplink
                "0a52",     // ball-float
                "8290",     // 4.5 bar ties 4.0 and 5.0, first row wins: 143.6 -> 144
                "8302000a",
                "83020105",
                "8d020014",
                "8d02010c", // slval0 3 * 4
                "8d020228",
                "8d020305",
                "8d02043c",
                "8d020507",
                "84020024",
                "85020048",
                "01000384", // 900 s
            ]
        );
    }

    #[test]
    fn test_encode_reset_counters_adds_one_command() {
        let row = decision_row(SteamTrapType::BK);
        let plain = encode(&row, &pt_table(), 1.0, 25, settings(false)).unwrap();
        let reset = encode(&row, &pt_table(), 1.0, 25, settings(true)).unwrap();

        assert_eq!(plain.len(), 14);
        assert_eq!(reset.len(), 15);
        assert_eq!(reset[13], RESET_COUNTERS);
        assert_eq!(reset.last(), plain.last());
        assert_eq!(&reset[..13], &plain[..13]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let row = decision_row(SteamTrapType::MK);
        let first = encode(&row, &pt_table(), 3.0, 15, settings(true)).unwrap();
        let second = encode(&row, &pt_table(), 3.0, 15, settings(true)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[1], "0a51");
        assert_eq!(first[3], "8301000a");
    }

    #[test]
    fn test_correction_factor() {
        assert_eq!(steam_loss_correction(SteamTrapType::UNA, 40), 4);
        assert_eq!(steam_loss_correction(SteamTrapType::UNA, 39), 1);
        assert_eq!(steam_loss_correction(SteamTrapType::BK, 100), 1);
        assert_eq!(steam_loss_correction(SteamTrapType::MK, 40), 1);

        let small = encode(&decision_row(SteamTrapType::UNA), &pt_table(), 4.0, 39, settings(false)).unwrap();
        assert_eq!(small[6], "8d020103");
        // only band 0 is corrected
        let large = encode(&decision_row(SteamTrapType::UNA), &pt_table(), 4.0, 40, settings(false)).unwrap();
        assert_eq!(large[6], "8d02010c");
        assert_eq!(large[8], "8d020305");
        assert_eq!(large[10], "8d020507");
    }

    #[test]
    fn test_encode_overflow_is_an_error() {
        let mut row = decision_row(SteamTrapType::UNA);
        row.slval0 = 100; // 400 after correction
        let result = encode(&row, &pt_table(), 4.0, 50, settings(false));
        assert!(matches!(result, Err(EncodeError::Overflow { value: 400, .. })));

        let mut row = decision_row(SteamTrapType::BK);
        row.tv = 300;
        assert!(encode(&row, &pt_table(), 4.0, 50, settings(false)).is_err());
    }

    #[test]
    fn test_uplink_frequency_must_fit_three_bytes() {
        let row = decision_row(SteamTrapType::BK);
        let mut settings = settings(false);

        settings.uplink_frequency = 0x00ff_ffff;
        let downlinks = encode(&row, &pt_table(), 1.0, 25, settings).unwrap();
        assert_eq!(downlinks.last().unwrap(), "01ffffff");

        settings.uplink_frequency = 0x0100_0000;
        let result = encode(&row, &pt_table(), 1.0, 25, settings);
        assert_eq!(
            result,
            Err(EncodeError::Overflow {
                value: 0x0100_0000,
                digits: 7,
                width: 6
            })
        );
    }

    #[test]
    fn test_encode_rejects_bad_temperature() {
        let pt = PtTable::new(vec![PtRow { pressure: 1.0, temperature: -5.0 }]);
        let result = encode(&decision_row(SteamTrapType::BK), &pt, 1.0, 25, settings(false));
        assert_eq!(result, Err(EncodeError::InvalidTemperature(-5.0)));

        let result = encode(&decision_row(SteamTrapType::BK), &PtTable::default(), 1.0, 25, settings(false));
        assert_eq!(result, Err(EncodeError::EmptyPtTable));
    }
}
