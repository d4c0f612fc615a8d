use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ModemError;

/// Supported square constellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Modulation {
    #[default]
    #[serde(rename = "QPSK")]
    Qpsk,
    #[serde(rename = "16-QAM")]
    Qam16,
    #[serde(rename = "64-QAM")]
    Qam64,
}

impl Modulation {
    /// Every scheme, in increasing order.
    pub const ALL: [Modulation; 3] = [Modulation::Qpsk, Modulation::Qam16, Modulation::Qam64];

    pub fn bits_per_symbol(self) -> usize {
        match self {
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
        }
    }

    /// Number of points in the constellation.
    pub fn order(self) -> usize {
        1 << self.bits_per_symbol()
    }

    pub fn name(self) -> &'static str {
        match self {
            Modulation::Qpsk => "QPSK",
            Modulation::Qam16 => "16-QAM",
            Modulation::Qam64 => "64-QAM",
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Modulation {
    type Err = ModemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match key.as_str() {
            "QPSK" | "4QAM" => Ok(Modulation::Qpsk),
            "16QAM" | "QAM16" => Ok(Modulation::Qam16),
            "64QAM" | "QAM64" => Ok(Modulation::Qam64),
            _ => Err(ModemError::UnsupportedModulation(s.to_string())),
        }
    }
}
