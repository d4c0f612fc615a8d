//! Stochastic channel models: AWGN and Rayleigh multipath with Doppler.

pub mod awgn;
pub mod fading;
pub mod profile;

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use awgn::{measured_snr_db, signal_power, AwgnChannel, SnrInfo};
pub use fading::{PathTap, TappedDelayLine};
pub use profile::{doppler_hz, profile_entry, profile_names, ChannelProfile, ProfileEntry};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),
    #[error("multipath channel requires a sample rate")]
    MissingSampleRate,
    #[error("multipath channel requires a channel profile")]
    MissingProfile,
    #[error("unknown channel profile: {0}")]
    UnknownProfile(String),
    #[error("profile has {delays} delays but {gains} gains")]
    ProfileShape { delays: usize, gains: usize },
    #[error("expected {expected} tap coefficients, got {actual}")]
    TapCount { expected: usize, actual: usize },
    #[error("SNR of {0} dB does not give a finite noise power")]
    InvalidSnr(f64),
}

/// Received samples and the noise that was added to them.
#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    pub received: Vec<Complex<f64>>,
    pub noise: Vec<Complex<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    #[default]
    Awgn,
    RayleighMultipath,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Awgn => f.write_str("awgn"),
            ChannelKind::RayleighMultipath => f.write_str("rayleigh-multipath"),
        }
    }
}

impl FromStr for ChannelKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "awgn" => Ok(ChannelKind::Awgn),
            "rayleigh" | "multipath" | "rayleigh-multipath" => Ok(ChannelKind::RayleighMultipath),
            _ => Err(ChannelError::UnknownChannelType(s.to_string())),
        }
    }
}

/// Everything needed to build a [`Channel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub kind: ChannelKind,
    pub snr_db: f64,
    /// Required for multipath.
    pub sample_rate_hz: Option<f64>,
    /// Required for multipath.
    pub profile: Option<ChannelProfile>,
    pub seed: u64,
}

/// Rayleigh fading followed by AWGN referenced to the faded signal power.
#[derive(Debug, Clone)]
pub struct MultipathChannel {
    profile: ChannelProfile,
    fading: TappedDelayLine,
    awgn: AwgnChannel,
    rng: ChaCha8Rng,
}

impl MultipathChannel {
    pub fn new(
        sample_rate_hz: f64,
        profile: ChannelProfile,
        snr_db: f64,
        seed: u64,
    ) -> Result<Self, ChannelError> {
        if !(sample_rate_hz > 0.0 && sample_rate_hz.is_finite()) {
            return Err(ChannelError::MissingSampleRate);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let fading = TappedDelayLine::new(sample_rate_hz, &profile, rng.gen());
        let awgn = AwgnChannel::new(snr_db, rng.gen());
        Ok(Self {
            profile,
            fading,
            awgn,
            rng,
        })
    }

    pub fn profile(&self) -> &ChannelProfile {
        &self.profile
    }

    pub fn fading(&self) -> &TappedDelayLine {
        &self.fading
    }

    pub fn awgn(&self) -> &AwgnChannel {
        &self.awgn
    }

    /// Replace the delay line with one built from `profile`.
    pub fn set_profile(&mut self, profile: ChannelProfile) {
        let fading = TappedDelayLine::new(self.fading.sample_rate_hz(), &profile, self.rng.gen());
        debug!(profile = %profile.name, paths = fading.paths().len(), "multipath profile replaced");
        self.fading = fading;
        self.profile = profile;
    }

    pub fn set_snr(&mut self, snr_db: f64) {
        self.awgn.set_snr(snr_db);
    }

    pub fn transmit(&mut self, signal: &[Complex<f64>]) -> Result<ChannelOutput, ChannelError> {
        let faded = self.fading.filter(signal);
        self.awgn.transmit(&faded)
    }
}

/// The configured channel.
#[derive(Debug, Clone)]
pub enum Channel {
    Awgn(AwgnChannel),
    Multipath(MultipathChannel),
}

impl Channel {
    pub fn build(settings: &ChannelSettings) -> Result<Self, ChannelError> {
        match settings.kind {
            ChannelKind::Awgn => Ok(Channel::Awgn(AwgnChannel::new(
                settings.snr_db,
                settings.seed,
            ))),
            ChannelKind::RayleighMultipath => {
                let sample_rate_hz = settings
                    .sample_rate_hz
                    .ok_or(ChannelError::MissingSampleRate)?;
                let profile = settings
                    .profile
                    .clone()
                    .ok_or(ChannelError::MissingProfile)?;
                Ok(Channel::Multipath(MultipathChannel::new(
                    sample_rate_hz,
                    profile,
                    settings.snr_db,
                    settings.seed,
                )?))
            }
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Awgn(_) => ChannelKind::Awgn,
            Channel::Multipath(_) => ChannelKind::RayleighMultipath,
        }
    }

    pub fn set_snr(&mut self, snr_db: f64) {
        match self {
            Channel::Awgn(ch) => ch.set_snr(snr_db),
            Channel::Multipath(ch) => ch.set_snr(snr_db),
        }
    }

    pub fn snr_info(&self) -> SnrInfo {
        match self {
            Channel::Awgn(ch) => ch.snr_info(),
            Channel::Multipath(ch) => ch.awgn().snr_info(),
        }
    }

    pub fn profile(&self) -> Option<&ChannelProfile> {
        match self {
            Channel::Awgn(_) => None,
            Channel::Multipath(ch) => Some(ch.profile()),
        }
    }

    pub fn transmit(&mut self, signal: &[Complex<f64>]) -> Result<ChannelOutput, ChannelError> {
        match self {
            Channel::Awgn(ch) => ch.transmit(signal),
            Channel::Multipath(ch) => ch.transmit(signal),
        }
    }

    /// Per-bin channel response of the latest pass at time `t_s`.
    ///
    /// `None` for AWGN, which leaves subcarriers untouched, and for a
    /// multipath channel that has not transmitted yet.
    pub fn bin_response(&self, t_s: f64, fft_size: usize, bins: usize) -> Option<Vec<Complex<f64>>> {
        match self {
            Channel::Awgn(_) => None,
            Channel::Multipath(ch) => ch.fading().bin_response(t_s, fft_size, bins),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: ChannelKind) -> ChannelSettings {
        ChannelSettings {
            kind,
            snr_db: 20.0,
            sample_rate_hz: Some(7.68e6),
            profile: Some(ChannelProfile::from_table("Pedestrian A", None, None).expect("profile")),
            seed: 99,
        }
    }

    #[test]
    fn parses_channel_kinds() {
        assert_eq!("AWGN".parse::<ChannelKind>(), Ok(ChannelKind::Awgn));
        assert_eq!("rayleigh".parse::<ChannelKind>(), Ok(ChannelKind::RayleighMultipath));
        assert_eq!(
            "rician".parse::<ChannelKind>(),
            Err(ChannelError::UnknownChannelType("rician".to_string()))
        );
    }

    #[test]
    fn multipath_requires_sample_rate() {
        let mut s = settings(ChannelKind::RayleighMultipath);
        s.sample_rate_hz = None;
        assert!(matches!(Channel::build(&s), Err(ChannelError::MissingSampleRate)));
    }

    #[test]
    fn multipath_requires_profile() {
        let mut s = settings(ChannelKind::RayleighMultipath);
        s.profile = None;
        assert!(matches!(Channel::build(&s), Err(ChannelError::MissingProfile)));
    }

    #[test]
    fn awgn_ignores_multipath_fields() {
        let mut s = settings(ChannelKind::Awgn);
        s.sample_rate_hz = None;
        let channel = Channel::build(&s).expect("build");
        assert_eq!(channel.kind(), ChannelKind::Awgn);
        assert!(channel.profile().is_none());
    }

    #[test]
    fn multipath_preserves_length() {
        let mut channel = Channel::build(&settings(ChannelKind::RayleighMultipath)).expect("build");
        let signal = vec![Complex::new(0.5, -0.5); 1000];
        let out = channel.transmit(&signal).expect("transmit");
        assert_eq!(out.received.len(), signal.len());
        assert_eq!(out.noise.len(), signal.len());
    }

    #[test]
    fn snr_change_keeps_delay_line() {
        let mut channel =
            MultipathChannel::new(7.68e6, settings(ChannelKind::Awgn).profile.expect("p"), 10.0, 3)
                .expect("build");
        let paths = channel.fading().paths().to_vec();
        channel.set_snr(0.0);
        assert_eq!(channel.fading().paths(), paths.as_slice());
        assert_eq!(channel.awgn().snr_db(), 0.0);
    }

    #[test]
    fn profile_swap_replaces_taps() {
        let mut channel =
            MultipathChannel::new(7.68e6, settings(ChannelKind::Awgn).profile.expect("p"), 10.0, 3)
                .expect("build");
        assert_eq!(channel.fading().paths().len(), 4);
        let vb = ChannelProfile::from_table("Vehicular B", None, None).expect("profile");
        channel.set_profile(vb);
        assert_eq!(channel.fading().paths().len(), 6);
        assert_eq!(channel.profile().name, "Vehicular B");
        assert_eq!(channel.awgn().snr_db(), 10.0);
    }

    #[test]
    fn noise_follows_faded_power() {
        let profile = ChannelProfile::from_table("Vehicular A", None, None).expect("profile");
        let mut channel = MultipathChannel::new(7.68e6, profile, 15.0, 21).expect("build");
        let signal: Vec<_> = (0..4000)
            .map(|n| Complex::from_polar(1.0 + (n % 7) as f64 * 0.1, n as f64 * 0.37))
            .collect();
        let out = channel.transmit(&signal).expect("transmit");

        let faded: Vec<_> = out.received.iter().zip(&out.noise).map(|(r, n)| r - n).collect();
        let expected = signal_power(&faded) / 10f64.powf(1.5);
        let noise_power = channel.awgn().noise_power().expect("noise power");
        assert!((noise_power - expected).abs() < 1e-9 * expected);
        assert!((noise_power - signal_power(&signal) / 10f64.powf(1.5)).abs() > 1e-6 * expected);
    }

    #[test]
    fn bin_response_only_for_multipath() {
        let signal = vec![Complex::new(1.0, 0.0); 600];
        let mut awgn = Channel::build(&settings(ChannelKind::Awgn)).expect("build");
        awgn.transmit(&signal).expect("transmit");
        assert!(awgn.bin_response(0.0, 512, 300).is_none());

        let mut multipath = Channel::build(&settings(ChannelKind::RayleighMultipath)).expect("build");
        assert!(multipath.bin_response(0.0, 512, 300).is_none());
        multipath.transmit(&signal).expect("transmit");
        assert_eq!(multipath.bin_response(1.0e-5, 512, 300).map(|r| r.len()), Some(300));
    }
}
