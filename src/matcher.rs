//! Decision-table row matching

use thiserror::Error;

use crate::tables::{DecisionRow, DeviceSpec};

/// Why a device has no decision row
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoMatch {
    #[error("no decision row with matching steam-trap type, mounting type, hardware model and condensate load")]
    NoCategory,

    #[error("pressure {pressure} bar outside the window of all {candidates} categorical matches")]
    PressureOutOfRange { pressure: f64, candidates: usize },
}

impl DecisionRow {
    /// Categorical keys equal to the device's
    pub fn same_category(&self, device: &DeviceSpec) -> bool {
        self.steam_trap_type == device.steam_trap_type
            && self.mounting_type == device.mounting_type
            && self.hardware_model == device.hardware_model
            && self.condensate_load == device.condensate_load
    }

    /// Inclusive pressure window check
    pub fn covers(&self, pressure: f64) -> bool {
        self.p_min <= pressure && pressure <= self.p_max
    }
}

/// First decision row (in table order) matching the device
pub fn match_device<'a>(device: &DeviceSpec, table: &'a [DecisionRow]) -> Result<&'a DecisionRow, NoMatch> {
    let pressure = device.differential_pressure;
    let mut candidates = 0;

    for row in table.iter().filter(|row| row.same_category(device)) {
        if row.covers(pressure) {
            return Ok(row);
        }
        candidates += 1;
    }

    if candidates == 0 {
        Err(NoMatch::NoCategory)
    } else {
        Err(NoMatch::PressureOutOfRange { pressure, candidates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{Label, MountingType, SteamTrapType};

    fn row(index: u32, trap: SteamTrapType, p_min: f64, p_max: f64) -> DecisionRow {
        DecisionRow {
            index: Some(index),
            steam_trap_type: trap,
            mounting_type: MountingType::PBS,
            hardware_model: Label::new("MSB-1"),
            condensate_load: Label::new("low"),
            p_min,
            p_max,
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

    fn device(trap: SteamTrapType, pressure: f64) -> DeviceSpec {
        DeviceSpec {
            deveui: "24E124000000A001".to_string(),
            server: "192.168.1.10".to_string(),
            steam_trap_type: trap,
            mounting_type: MountingType::PBS,
            hardware_model: Label::new("msb-1"),
            dn: 50,
            differential_pressure: pressure,
            application: None,
            condensate_load: Label::new("Low"),
        }
    }

    #[test]
    fn test_match_inside_window() {
        let table = vec![
            row(0, SteamTrapType::BK, 0.0, 10.0),
            row(1, SteamTrapType::UNA, 0.0, 5.0),
            row(2, SteamTrapType::UNA, 5.0, 16.0),
        ];
        let matched = match_device(&device(SteamTrapType::UNA, 8.0), &table).unwrap();
        assert_eq!(matched.index, Some(2));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let table = vec![row(0, SteamTrapType::MK, 2.0, 6.0)];
        assert!(match_device(&device(SteamTrapType::MK, 2.0), &table).is_ok());
        assert!(match_device(&device(SteamTrapType::MK, 6.0), &table).is_ok());
    }

    #[test]
    fn test_first_match_wins() {
        let table = vec![
            row(0, SteamTrapType::BK, 0.0, 10.0),
            row(1, SteamTrapType::BK, 5.0, 20.0),
        ];
        let matched = match_device(&device(SteamTrapType::BK, 7.0), &table).unwrap();
        assert_eq!(matched.index, Some(0));
    }

    #[test]
    fn test_pressure_outside_all_windows() {
        let table = vec![
            row(0, SteamTrapType::UNA, 0.0, 5.0),
            row(1, SteamTrapType::BK, 0.0, 50.0),
            row(2, SteamTrapType::UNA, 5.0, 16.0),
        ];
        let result = match_device(&device(SteamTrapType::UNA, 20.0), &table);
        assert_eq!(
            result,
            Err(NoMatch::PressureOutOfRange {
                pressure: 20.0,
                candidates: 2
            })
        );
    }

    #[test]
    fn test_no_categorical_match() {
        let table = vec![row(0, SteamTrapType::BK, 0.0, 10.0)];
        let result = match_device(&device(SteamTrapType::MK, 1.0), &table);
        assert_eq!(result, Err(NoMatch::NoCategory));
        assert_eq!(match_device(&device(SteamTrapType::MK, 1.0), &[]), Err(NoMatch::NoCategory));
    }

    #[test]
    fn test_other_categorical_keys_must_match() {
        let mut other_model = row(0, SteamTrapType::BK, 0.0, 10.0);
        other_model.hardware_model = Label::new("MSB-2");
        let mut other_mounting = row(1, SteamTrapType::BK, 0.0, 10.0);
        other_mounting.mounting_type = MountingType::RFC;

        let table = vec![other_model, other_mounting];
        assert_eq!(
            match_device(&device(SteamTrapType::BK, 1.0), &table),
            Err(NoMatch::NoCategory)
        );
    }
}
