//! Categorical device properties
//!
//! Steam-trap and mounting types are closed vocabularies. Every variant carries
//! a numeric code (used in downlink payloads), a short phrase and a long
//! description; table cells may use any of the three.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct UnknownCategory {
    pub kind: &'static str,
    pub value: String,
}

/// Steam-trap construction type
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SteamTrapType {
    /// Bimetallic
    BK = 0,
    /// Membrane
    MK = 1,
    /// Ball-float
    UNA = 2,
}

/// Sensor mounting type
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MountingType {
    /// Pressure-bearing screw
    PBS = 0,
    /// Adapter
    ADP = 1,
    /// Retro-fit clamp
    RFC = 2,
}

// (variant, code, phrase, description)
static STEAM_TRAP_TYPES: [(SteamTrapType, u8, &str, &str); 3] = [
    (SteamTrapType::BK, 0, "BK", "bimetallic"),
    (SteamTrapType::MK, 1, "MK", "membrane"),
    (SteamTrapType::UNA, 2, "UNA", "ball-float"),
];

static MOUNTING_TYPES: [(MountingType, u8, &str, &str); 3] = [
    (MountingType::PBS, 0, "PBS", "pressure-bearing-screw"),
    (MountingType::ADP, 1, "ADP", "adapter"),
    (MountingType::RFC, 2, "RFC", "retro-fit-clamp"),
];

/// Shared lookup behaviour for the code/phrase/description tables
macro_rules! categorical {
    ($ty:ident, $table:ident, $kind:literal) => {
        impl $ty {
            /// Tables are ordered by discriminant, which is also the code
            fn entry(self) -> &'static ($ty, u8, &'static str, &'static str) {
                &$table[self as usize]
            }

            /// Numeric code used in downlink payloads
            pub fn code(self) -> u8 {
                self.entry().1
            }

            pub fn phrase(self) -> &'static str {
                self.entry().2
            }

            pub fn description(self) -> &'static str {
                self.entry().3
            }

            pub fn from_code(code: u8) -> Option<Self> {
                $table.iter().find(|e| e.1 == code).map(|e| e.0)
            }

            pub fn from_phrase(phrase: &str) -> Option<Self> {
                let phrase = phrase.trim();
                $table
                    .iter()
                    .find(|e| e.2.eq_ignore_ascii_case(phrase))
                    .map(|e| e.0)
            }

            pub fn from_description(description: &str) -> Option<Self> {
                let description = description.trim();
                $table
                    .iter()
                    .find(|e| e.3.eq_ignore_ascii_case(description))
                    .map(|e| e.0)
            }
        }

        impl FromStr for $ty {
            type Err = UnknownCategory;

            /// Accepts a phrase, a description or a numeric code
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::from_phrase(s)
                    .or_else(|| Self::from_description(s))
                    .or_else(|| s.parse::<u8>().ok().and_then(Self::from_code))
                    .ok_or_else(|| UnknownCategory {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.phrase())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

categorical!(SteamTrapType, STEAM_TRAP_TYPES, "steam-trap type");
categorical!(MountingType, MOUNTING_TYPES, "mounting type");

impl SteamTrapType {
    pub const ALL: [SteamTrapType; 3] = [SteamTrapType::BK, SteamTrapType::MK, SteamTrapType::UNA];
}

impl MountingType {
    pub const ALL: [MountingType; 3] = [MountingType::PBS, MountingType::ADP, MountingType::RFC];
}

/// Open-vocabulary categorical value (hardware model, condensate load)
///
/// Compared on its normalised form, so `" Medium"` and `"medium"` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Label::new(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steam_trap_lookups() {
        assert_eq!(SteamTrapType::UNA.code(), 2);
        assert_eq!(SteamTrapType::UNA.phrase(), "UNA");
        assert_eq!(SteamTrapType::UNA.description(), "ball-float");

        assert_eq!(SteamTrapType::from_code(1), Some(SteamTrapType::MK));
        assert_eq!(SteamTrapType::from_code(7), None);
        assert_eq!(SteamTrapType::from_phrase(" bk "), Some(SteamTrapType::BK));
        assert_eq!(
            SteamTrapType::from_description("Ball-Float"),
            Some(SteamTrapType::UNA)
        );
    }

    #[test]
    fn test_parse_accepts_phrase_description_and_code() {
        assert_eq!("MK".parse::<SteamTrapType>(), Ok(SteamTrapType::MK));
        assert_eq!("membrane".parse::<SteamTrapType>(), Ok(SteamTrapType::MK));
        assert_eq!("1".parse::<SteamTrapType>(), Ok(SteamTrapType::MK));
        assert_eq!("retro-fit-clamp".parse::<MountingType>(), Ok(MountingType::RFC));

        let err = "bucket".parse::<SteamTrapType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown steam-trap type: 'bucket'");
    }

    #[test]
    fn test_all_variants_have_distinct_codes() {
        let codes: Vec<u8> = MountingType::ALL.iter().map(|m| m.code()).collect();
        assert_eq!(codes, vec![0, 1, 2]);
        let codes: Vec<u8> = SteamTrapType::ALL.iter().map(|t| t.code()).collect();
        assert_eq!(codes, vec![0, 1, 2]);
    }

    #[test]
    fn test_tables_follow_discriminants() {
        for (idx, entry) in STEAM_TRAP_TYPES.iter().enumerate() {
            assert_eq!(entry.0 as usize, idx);
            assert_eq!(entry.1 as usize, idx);
            assert_eq!(entry.0.phrase(), entry.2);
        }
        for (idx, entry) in MOUNTING_TYPES.iter().enumerate() {
            assert_eq!(entry.0 as usize, idx);
            assert_eq!(entry.1 as usize, idx);
            assert_eq!(entry.0.description(), entry.3);
        }
    }

    #[test]
    fn test_label_normalises() {
        assert_eq!(Label::new(" Medium "), Label::new("medium"));
        assert_ne!(Label::new("MSB-1"), Label::new("MSB-2"));
    }
}
