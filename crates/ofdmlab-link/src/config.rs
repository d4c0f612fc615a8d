//! Link and channel configuration.
//!
//! [`LinkParams`] is the user-facing description of a link (bandwidth,
//! spacing, prefix type). [`LinkConfig`] is the immutable set of dimensions
//! derived from it that the engine actually runs with.

use std::fmt;
use std::str::FromStr;

use ofdmlab_channel::{ChannelError, ChannelKind, ChannelProfile, ChannelSettings};
use ofdmlab_modem::{Modulation, OfdmParams};
use serde::{Deserialize, Serialize};

use crate::LinkError;

/// LTE channel bandwidths in MHz with their active subcarriers and FFT size.
const LTE_BANDWIDTHS: [(f64, usize, usize); 6] = [
    (1.25, 76, 128),
    (2.5, 150, 256),
    (5.0, 300, 512),
    (10.0, 600, 1024),
    (15.0, 900, 2048),
    (20.0, 1200, 2048),
];

/// The standard LTE channel bandwidths in MHz, narrowest first.
pub fn lte_bandwidths() -> impl Iterator<Item = f64> {
    LTE_BANDWIDTHS.iter().map(|&(bw, _, _)| bw)
}

const NORMAL_CP_US: f64 = 4.7;
const EXTENDED_CP_15KHZ_US: f64 = 16.6;
const EXTENDED_CP_7_5KHZ_US: f64 = 33.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclicPrefix {
    #[default]
    Normal,
    Extended,
}

impl CyclicPrefix {
    /// Prefix duration in microseconds for a given subcarrier spacing.
    pub fn duration_us(self, subcarrier_spacing_khz: f64) -> f64 {
        match self {
            CyclicPrefix::Normal => NORMAL_CP_US,
            CyclicPrefix::Extended if (subcarrier_spacing_khz - 15.0).abs() < 1e-9 => {
                EXTENDED_CP_15KHZ_US
            }
            CyclicPrefix::Extended => EXTENDED_CP_7_5KHZ_US,
        }
    }
}

impl fmt::Display for CyclicPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclicPrefix::Normal => f.write_str("normal"),
            CyclicPrefix::Extended => f.write_str("extended"),
        }
    }
}

impl FromStr for CyclicPrefix {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(CyclicPrefix::Normal),
            "extended" => Ok(CyclicPrefix::Extended),
            _ => Err(LinkError::InvalidConfig(format!(
                "unknown cyclic prefix type: {s}"
            ))),
        }
    }
}

/// User-facing link options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    pub bandwidth_mhz: f64,
    pub subcarrier_spacing_khz: f64,
    pub cyclic_prefix: CyclicPrefix,
    pub modulation: Modulation,
    pub sc_fdm: bool,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            bandwidth_mhz: 5.0,
            subcarrier_spacing_khz: 15.0,
            cyclic_prefix: CyclicPrefix::Normal,
            modulation: Modulation::Qpsk,
            sc_fdm: false,
        }
    }
}

/// Air-time figures for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransmissionMetrics {
    pub n_ofdm_symbols: usize,
    pub duration_s: f64,
    pub throughput_mbps: f64,
}

/// Immutable link dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkConfig {
    bandwidth_mhz: f64,
    subcarrier_spacing_khz: f64,
    /// `None` when the prefix length was given in samples.
    cyclic_prefix: Option<CyclicPrefix>,
    fft_size: usize,
    active_subcarriers: usize,
    cp_length: usize,
    modulation: Modulation,
    sc_fdm: bool,
    sample_rate_hz: f64,
}

impl LinkConfig {
    /// Derive the dimensions for `params`.
    ///
    /// LTE bandwidths use their standard allocation. Any other bandwidth
    /// fills `floor(BW / Δf)` subcarriers into the next power-of-two FFT.
    pub fn from_params(params: &LinkParams) -> Result<Self, LinkError> {
        let bw = params.bandwidth_mhz;
        let spacing = params.subcarrier_spacing_khz;
        if !(bw > 0.0 && bw.is_finite()) {
            return Err(LinkError::InvalidConfig(format!("bandwidth {bw} MHz")));
        }
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(LinkError::InvalidConfig(format!(
                "subcarrier spacing {spacing} kHz"
            )));
        }

        let (active_subcarriers, fft_size) = match LTE_BANDWIDTHS
            .iter()
            .find(|(lte_bw, _, _)| (lte_bw - bw).abs() < 1e-9)
        {
            Some(&(_, nc, n)) => (nc, n),
            None => {
                let nc = (bw * 1.0e3 / spacing).floor() as usize;
                let n = nc.checked_next_power_of_two().ok_or_else(|| {
                    LinkError::InvalidConfig(format!(
                        "bandwidth {bw} MHz needs more subcarriers than an FFT can hold"
                    ))
                })?;
                (nc, n)
            }
        };

        let sample_rate_hz = fft_size as f64 * spacing * 1.0e3;
        let cp_duration_s = params.cyclic_prefix.duration_us(spacing) * 1.0e-6;
        let cp_length = (cp_duration_s * sample_rate_hz).floor() as usize;

        let config = Self {
            bandwidth_mhz: bw,
            subcarrier_spacing_khz: spacing,
            cyclic_prefix: Some(params.cyclic_prefix),
            fft_size,
            active_subcarriers,
            cp_length,
            modulation: params.modulation,
            sc_fdm: params.sc_fdm,
            sample_rate_hz,
        };
        config.ofdm_params().validate()?;
        Ok(config)
    }

    /// Explicit dimensions; the occupied bandwidth is `Nc · Δf`.
    pub fn custom(
        fft_size: usize,
        active_subcarriers: usize,
        cp_length: usize,
        modulation: Modulation,
        subcarrier_spacing_khz: f64,
    ) -> Result<Self, LinkError> {
        if !(subcarrier_spacing_khz > 0.0 && subcarrier_spacing_khz.is_finite()) {
            return Err(LinkError::InvalidConfig(format!(
                "subcarrier spacing {subcarrier_spacing_khz} kHz"
            )));
        }
        let config = Self {
            bandwidth_mhz: active_subcarriers as f64 * subcarrier_spacing_khz * 1.0e-3,
            subcarrier_spacing_khz,
            cyclic_prefix: None,
            fft_size,
            active_subcarriers,
            cp_length,
            modulation,
            sc_fdm: false,
            sample_rate_hz: fft_size as f64 * subcarrier_spacing_khz * 1.0e3,
        };
        config.ofdm_params().validate()?;
        Ok(config)
    }

    pub fn with_modulation(&self, modulation: Modulation) -> Self {
        Self {
            modulation,
            ..self.clone()
        }
    }

    pub fn with_sc_fdm(&self, sc_fdm: bool) -> Self {
        Self {
            sc_fdm,
            ..self.clone()
        }
    }

    pub fn bandwidth_mhz(&self) -> f64 {
        self.bandwidth_mhz
    }

    pub fn subcarrier_spacing_khz(&self) -> f64 {
        self.subcarrier_spacing_khz
    }

    pub fn cyclic_prefix(&self) -> Option<CyclicPrefix> {
        self.cyclic_prefix
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn active_subcarriers(&self) -> usize {
        self.active_subcarriers
    }

    pub fn cp_length(&self) -> usize {
        self.cp_length
    }

    pub fn modulation(&self) -> Modulation {
        self.modulation
    }

    pub fn sc_fdm(&self) -> bool {
        self.sc_fdm
    }

    pub fn bits_per_symbol(&self) -> usize {
        self.modulation.bits_per_symbol()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn sample_period_s(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    pub fn cp_duration_s(&self) -> f64 {
        self.cp_length as f64 * self.sample_period_s()
    }

    pub fn samples_per_symbol(&self) -> usize {
        self.fft_size + self.cp_length
    }

    pub fn ofdm_params(&self) -> OfdmParams {
        OfdmParams {
            fft_size: self.fft_size,
            active_subcarriers: self.active_subcarriers,
            cp_len: self.cp_length,
            modulation: self.modulation,
            sc_fdm: self.sc_fdm,
        }
    }

    pub fn transmission_metrics(&self, num_bits: usize) -> TransmissionMetrics {
        let per_symbol = self.active_subcarriers * self.bits_per_symbol();
        let n_ofdm_symbols = num_bits.div_ceil(per_symbol);
        let duration_s =
            (n_ofdm_symbols * self.samples_per_symbol()) as f64 * self.sample_period_s();
        let throughput_mbps = if duration_s > 0.0 {
            num_bits as f64 / duration_s / 1.0e6
        } else {
            0.0
        };
        TransmissionMetrics {
            n_ofdm_symbols,
            duration_s,
            throughput_mbps,
        }
    }
}

/// Channel options. Profile, carrier and velocity apply to multipath only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    pub profile: Option<String>,
    pub carrier_ghz: Option<f64>,
    pub velocity_kmh: Option<f64>,
    /// Seed for the engine's generator; entropy when unset.
    pub seed: Option<u64>,
}

impl ChannelConfig {
    pub fn awgn() -> Self {
        Self::default()
    }

    pub fn rayleigh(profile: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::RayleighMultipath,
            profile: Some(profile.into()),
            ..Self::default()
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    /// Build the settings for a channel running at `link`'s sample rate.
    pub fn resolve(
        &self,
        link: &LinkConfig,
        snr_db: f64,
        seed: u64,
    ) -> Result<ChannelSettings, ChannelError> {
        let profile = match self.kind {
            ChannelKind::Awgn => None,
            ChannelKind::RayleighMultipath => {
                let name = self.profile.as_deref().ok_or(ChannelError::MissingProfile)?;
                Some(ChannelProfile::from_table(
                    name,
                    self.carrier_ghz,
                    self.velocity_kmh,
                )?)
            }
        };
        Ok(ChannelSettings {
            kind: self.kind,
            snr_db,
            sample_rate_hz: Some(link.sample_rate_hz()),
            profile,
            seed,
        })
    }
}
