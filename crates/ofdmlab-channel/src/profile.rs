//! ITU-R M.1225 tapped-delay-line profiles.

use phf::phf_ordered_map;
use serde::Serialize;

use crate::ChannelError;

const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// One row of the built-in profile table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileEntry {
    pub description: &'static str,
    pub delays_us: &'static [f64],
    pub gains_db: &'static [f64],
    /// Recommended carrier range in GHz.
    pub frequency_ghz: (f64, f64),
    /// Typical relative velocity range in km/h.
    pub velocity_kmh: (f64, f64),
}

impl ProfileEntry {
    pub fn mid_frequency_ghz(&self) -> f64 {
        (self.frequency_ghz.0 + self.frequency_ghz.1) / 2.0
    }

    pub fn mid_velocity_kmh(&self) -> f64 {
        (self.velocity_kmh.0 + self.velocity_kmh.1) / 2.0
    }
}

static ITU_R_M1225: phf::OrderedMap<&'static str, ProfileEntry> = phf_ordered_map! {
    "Indoor Office A" => ProfileEntry {
        description: "Indoor office, small delay spread",
        delays_us: &[0.0, 0.05, 0.11, 0.17, 0.29, 0.31],
        gains_db: &[0.0, -3.0, -10.0, -18.0, -26.0, -32.0],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (0.0, 5.0),
    },
    "Indoor Office B" => ProfileEntry {
        description: "Indoor office, large delay spread",
        delays_us: &[0.0, 0.1, 0.2, 0.3, 0.5, 0.7],
        gains_db: &[0.0, -3.6, -7.2, -10.8, -18.0, -25.2],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (0.0, 5.0),
    },
    "Pedestrian A" => ProfileEntry {
        description: "Outdoor to indoor and pedestrian, small delay spread",
        delays_us: &[0.0, 0.11, 0.19, 0.41],
        gains_db: &[0.0, -9.7, -19.2, -22.8],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (0.0, 10.0),
    },
    "Pedestrian B" => ProfileEntry {
        description: "Outdoor to indoor and pedestrian, large delay spread",
        delays_us: &[0.0, 0.2, 0.8, 1.2, 2.3, 3.7],
        gains_db: &[0.0, -0.9, -4.9, -8.0, -7.8, -23.9],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (0.0, 10.0),
    },
    "Vehicular A" => ProfileEntry {
        description: "Vehicular, small delay spread",
        delays_us: &[0.0, 0.31, 0.71, 1.09, 1.73, 2.51],
        gains_db: &[0.0, -1.0, -9.0, -10.0, -15.0, -20.0],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (30.0, 120.0),
    },
    "Vehicular B" => ProfileEntry {
        description: "Vehicular, large delay spread",
        delays_us: &[0.0, 0.3, 8.9, 12.9, 17.1, 20.0],
        gains_db: &[-2.5, 0.0, -12.8, -10.0, -25.2, -16.0],
        frequency_ghz: (1.8, 2.2),
        velocity_kmh: (30.0, 120.0),
    },
};

/// Table entry names in table order.
pub fn profile_names() -> impl Iterator<Item = &'static str> {
    ITU_R_M1225.keys().copied()
}

/// Look up a table entry, ignoring case and separators ("vehicular-a" works).
pub fn profile_entry(name: &str) -> Option<(&'static str, &'static ProfileEntry)> {
    if let Some((key, entry)) = ITU_R_M1225.get_entry(name) {
        return Some((*key, entry));
    }
    let wanted = normalize(name);
    ITU_R_M1225
        .entries()
        .find(|(key, _)| normalize(key) == wanted)
        .map(|(key, entry)| (*key, entry))
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Maximum Doppler shift `v/c · f_c` in Hz.
pub fn doppler_hz(carrier_ghz: f64, velocity_kmh: f64) -> f64 {
    (velocity_kmh / 3.6) * carrier_ghz * 1.0e9 / SPEED_OF_LIGHT_M_S
}

/// Resolved multipath profile: per-path delay and gain plus the Doppler limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelProfile {
    pub name: String,
    pub delays_s: Vec<f64>,
    pub gains_db: Vec<f64>,
    pub max_doppler_hz: f64,
}

impl ChannelProfile {
    pub fn new(
        name: impl Into<String>,
        delays_s: Vec<f64>,
        gains_db: Vec<f64>,
        max_doppler_hz: f64,
    ) -> Result<Self, ChannelError> {
        if delays_s.len() != gains_db.len() || delays_s.is_empty() {
            return Err(ChannelError::ProfileShape {
                delays: delays_s.len(),
                gains: gains_db.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            delays_s,
            gains_db,
            max_doppler_hz,
        })
    }

    /// Build a profile from the built-in table.
    ///
    /// Missing carrier or velocity values default to the midpoint of the
    /// entry's recommended range.
    pub fn from_table(
        name: &str,
        carrier_ghz: Option<f64>,
        velocity_kmh: Option<f64>,
    ) -> Result<Self, ChannelError> {
        let (key, entry) =
            profile_entry(name).ok_or_else(|| ChannelError::UnknownProfile(name.to_string()))?;
        let carrier_ghz = carrier_ghz.unwrap_or_else(|| entry.mid_frequency_ghz());
        let velocity_kmh = velocity_kmh.unwrap_or_else(|| entry.mid_velocity_kmh());
        Self::new(
            key,
            entry.delays_us.iter().map(|d| d * 1.0e-6).collect(),
            entry.gains_db.to_vec(),
            doppler_hz(carrier_ghz, velocity_kmh),
        )
    }

    /// Per-path amplitude gains.
    pub fn gains_linear(&self) -> Vec<f64> {
        self.gains_db.iter().map(|g| 10f64.powf(g / 20.0)).collect()
    }
}
