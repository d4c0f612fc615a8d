//! Additive white Gaussian noise.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex;
use serde::Serialize;

use crate::{ChannelError, ChannelOutput};

/// SNR bookkeeping for the most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnrInfo {
    pub snr_db: f64,
    pub snr_linear: f64,
    /// Noise power of the last transmission, if any.
    pub noise_power: Option<f64>,
}

/// AWGN channel scaling its noise to the measured input power.
#[derive(Debug, Clone)]
pub struct AwgnChannel {
    snr_db: f64,
    snr_linear: f64,
    noise_power: Option<f64>,
    rng: ChaCha8Rng,
}

impl AwgnChannel {
    pub fn new(snr_db: f64, seed: u64) -> Self {
        Self {
            snr_db,
            snr_linear: db_to_linear(snr_db),
            noise_power: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn set_snr(&mut self, snr_db: f64) {
        self.snr_db = snr_db;
        self.snr_linear = db_to_linear(snr_db);
    }

    pub fn snr_db(&self) -> f64 {
        self.snr_db
    }

    pub fn noise_power(&self) -> Option<f64> {
        self.noise_power
    }

    pub fn snr_info(&self) -> SnrInfo {
        SnrInfo {
            snr_db: self.snr_db,
            snr_linear: self.snr_linear,
            noise_power: self.noise_power,
        }
    }

    /// Add complex noise with variance `noise_power / 2` per rail.
    pub fn transmit(&mut self, signal: &[Complex<f64>]) -> Result<ChannelOutput, ChannelError> {
        let noise_power = self.noise_power_for(signal_power(signal))?;
        let dist = self.normal((noise_power / 2.0).sqrt())?;

        let noise: Vec<Complex<f64>> = (0..signal.len())
            .map(|_| Complex::new(dist.sample(&mut self.rng), dist.sample(&mut self.rng)))
            .collect();
        let received = signal.iter().zip(&noise).map(|(s, n)| s + n).collect();

        self.noise_power = Some(noise_power);
        Ok(ChannelOutput { received, noise })
    }

    /// Real-valued variant: a single Gaussian component with variance `noise_power`.
    pub fn transmit_real(&mut self, signal: &[f64]) -> Result<(Vec<f64>, Vec<f64>), ChannelError> {
        let power = if signal.is_empty() {
            0.0
        } else {
            signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64
        };
        let noise_power = self.noise_power_for(power)?;
        let dist = self.normal(noise_power.sqrt())?;

        let noise: Vec<f64> = (0..signal.len()).map(|_| dist.sample(&mut self.rng)).collect();
        let received = signal.iter().zip(&noise).map(|(s, n)| s + n).collect();

        self.noise_power = Some(noise_power);
        Ok((received, noise))
    }

    fn noise_power_for(&self, signal_power: f64) -> Result<f64, ChannelError> {
        if signal_power == 0.0 {
            return Ok(0.0);
        }
        let noise_power = signal_power / self.snr_linear;
        if !noise_power.is_finite() || noise_power < 0.0 {
            return Err(ChannelError::InvalidSnr(self.snr_db));
        }
        Ok(noise_power)
    }

    fn normal(&self, std_dev: f64) -> Result<Normal<f64>, ChannelError> {
        Normal::new(0.0, std_dev).map_err(|_| ChannelError::InvalidSnr(self.snr_db))
    }
}

/// Mean squared magnitude; zero for an empty signal.
pub fn signal_power(signal: &[Complex<f64>]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|s| s.norm_sqr()).sum::<f64>() / signal.len() as f64
}

/// SNR in dB from measured powers. Zero noise reads as `+inf`.
pub fn measured_snr_db(signal_power: f64, noise_power: f64) -> f64 {
    if noise_power == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal_power / noise_power).log10()
}

pub(crate) fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<Complex<f64>> {
        (0..len)
            .map(|i| Complex::from_polar(1.0, i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn noise_power_follows_snr() {
        let mut channel = AwgnChannel::new(10.0, 42);
        let signal = tone(50_000);
        let out = channel.transmit(&signal).expect("transmit");
        assert_eq!(out.received.len(), signal.len());

        let expected = 0.1;
        assert!((channel.noise_power().expect("power") - expected).abs() < 1e-12);
        let measured = signal_power(&out.noise);
        assert!((measured - expected).abs() / expected < 0.05, "measured {}", measured);
    }

    #[test]
    fn noise_is_split_between_rails() {
        let mut channel = AwgnChannel::new(0.0, 7);
        let out = channel.transmit(&tone(40_000)).expect("transmit");
        let n = out.noise.len() as f64;
        let re = out.noise.iter().map(|v| v.re * v.re).sum::<f64>() / n;
        let im = out.noise.iter().map(|v| v.im * v.im).sum::<f64>() / n;
        assert!((re - 0.5).abs() < 0.03 && (im - 0.5).abs() < 0.03, "{} {}", re, im);
    }

    #[test]
    fn seeded_channels_are_deterministic() {
        let signal = tone(64);
        let a = AwgnChannel::new(5.0, 3).transmit(&signal).expect("a");
        let b = AwgnChannel::new(5.0, 3).transmit(&signal).expect("b");
        assert_eq!(a.received, b.received);
    }

    #[test]
    fn zero_signal_gets_zero_noise() {
        let mut channel = AwgnChannel::new(10.0, 1);
        let out = channel.transmit(&[Complex::new(0.0, 0.0); 16]).expect("transmit");
        assert!(out.noise.iter().all(|n| n.norm() == 0.0));
        assert_eq!(channel.noise_power(), Some(0.0));
        assert!(channel.transmit(&[]).expect("empty").received.is_empty());
    }

    #[test]
    fn infinite_snr_is_noiseless() {
        let mut channel = AwgnChannel::new(f64::INFINITY, 1);
        let signal = tone(32);
        let out = channel.transmit(&signal).expect("transmit");
        assert_eq!(out.received, signal);
        assert_eq!(measured_snr_db(1.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn negative_infinite_snr_is_rejected() {
        let mut channel = AwgnChannel::new(f64::NEG_INFINITY, 1);
        assert!(matches!(
            channel.transmit(&tone(8)),
            Err(ChannelError::InvalidSnr(_))
        ));
    }

    #[test]
    fn real_signal_uses_single_component() {
        let mut channel = AwgnChannel::new(3.0, 9);
        let signal = vec![1.0; 40_000];
        let (received, noise) = channel.transmit_real(&signal).expect("transmit");
        assert_eq!(received.len(), signal.len());
        let power = noise.iter().map(|n| n * n).sum::<f64>() / noise.len() as f64;
        let expected = 1.0 / db_to_linear(3.0);
        assert!((power - expected).abs() / expected < 0.05);
    }
}
