//! Tapped-delay-line Rayleigh fading.
//!
//! Each path is delayed by its profile delay (rounded to whole samples), scaled by
//! its linear gain and multiplied by an independent complex fading process. The
//! process is a Gaussian-weighted sum of sinusoids:
//!
//!   h(t) = scale · Σ A_n · exp(j(2π f_D cos(α_n) t + φ_n))
//!
//! with complex Gaussian `A_n`, uniform angles of arrival `α_n` and uniform phases
//! `φ_n`. The envelope is Rayleigh distributed and its Doppler spectrum follows the
//! Clarke/Jakes shape bounded by `f_D`. A fresh process is drawn for every pass.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rustfft::num_complex::Complex;
use serde::Serialize;

use crate::{ChannelError, ChannelProfile};

const NUM_SINUSOIDS: usize = 32;

/// One resolved path of the delay line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathTap {
    pub delay_s: f64,
    pub delay_samples: usize,
    /// Linear amplitude gain.
    pub gain: f64,
}

/// Complex fading coefficient generator for a single path.
#[derive(Debug, Clone)]
struct FadingProcess {
    amp: [Complex<f64>; NUM_SINUSOIDS],
    freq: [f64; NUM_SINUSOIDS],
    phase: [f64; NUM_SINUSOIDS],
    scale: f64,
    fixed: bool,
}

impl FadingProcess {
    fn new(doppler_hz: f64, rng: &mut ChaCha8Rng) -> Self {
        // Independent generator per path.
        let mut tap_rng = ChaCha8Rng::seed_from_u64(rng.gen());
        if doppler_hz == 0.0 {
            return Self {
                amp: [Complex::new(0.0, 0.0); NUM_SINUSOIDS],
                freq: [0.0; NUM_SINUSOIDS],
                phase: [0.0; NUM_SINUSOIDS],
                scale: 1.0,
                fixed: true,
            };
        }

        let mut amp = [Complex::new(0.0, 0.0); NUM_SINUSOIDS];
        let mut freq = [0.0; NUM_SINUSOIDS];
        let mut phase = [0.0; NUM_SINUSOIDS];
        for n in 0..NUM_SINUSOIDS {
            amp[n] = Complex::new(
                tap_rng.sample::<f64, _>(StandardNormal),
                tap_rng.sample::<f64, _>(StandardNormal),
            );
            let alpha = tap_rng.gen::<f64>() * 2.0 * PI - PI;
            freq[n] = doppler_hz * alpha.cos();
            phase[n] = tap_rng.gen::<f64>() * 2.0 * PI;
        }

        // E|A_n|^2 = 2, so 1/sqrt(2N) gives unit mean power.
        let scale = (1.0 / (2.0 * NUM_SINUSOIDS as f64)).sqrt();
        Self {
            amp,
            freq,
            phase,
            scale,
            fixed: false,
        }
    }

    fn at(&self, t: f64) -> Complex<f64> {
        if self.fixed {
            return Complex::new(1.0, 0.0);
        }
        let mut h = Complex::new(0.0, 0.0);
        for n in 0..NUM_SINUSOIDS {
            let psi = 2.0 * PI * self.freq[n] * t + self.phase[n];
            h += self.amp[n] * Complex::from_polar(1.0, psi);
        }
        h * self.scale
    }
}

/// Multipath fading filter built from a [`ChannelProfile`].
#[derive(Debug, Clone)]
pub struct TappedDelayLine {
    sample_rate_hz: f64,
    max_doppler_hz: f64,
    paths: Vec<PathTap>,
    /// Processes drawn by the latest `filter` pass, one per path.
    realization: Vec<FadingProcess>,
    rng: ChaCha8Rng,
}

impl TappedDelayLine {
    pub fn new(sample_rate_hz: f64, profile: &ChannelProfile, seed: u64) -> Self {
        let paths = profile
            .delays_s
            .iter()
            .zip(profile.gains_linear())
            .map(|(&delay_s, gain)| PathTap {
                delay_s,
                delay_samples: (delay_s * sample_rate_hz).round().max(0.0) as usize,
                gain,
            })
            .collect();
        Self {
            sample_rate_hz,
            max_doppler_hz: profile.max_doppler_hz,
            paths,
            realization: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn max_doppler_hz(&self) -> f64 {
        self.max_doppler_hz
    }

    pub fn paths(&self) -> &[PathTap] {
        &self.paths
    }

    /// Pass `input` through the delay line. The output has the same length.
    pub fn filter(&mut self, input: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let mut out = vec![Complex::new(0.0, 0.0); input.len()];
        let dt = 1.0 / self.sample_rate_hz;
        let mut realization = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let process = FadingProcess::new(self.max_doppler_hz, &mut self.rng);
            for (n, y) in out.iter_mut().enumerate().skip(path.delay_samples) {
                let h = process.at(n as f64 * dt);
                *y += input[n - path.delay_samples] * h * path.gain;
            }
            realization.push(process);
        }
        self.realization = realization;
        out
    }

    /// Per-path coefficients `gain · h_i(t)` of the latest `filter` pass,
    /// `t` counted from its first sample. `None` before the first pass.
    pub fn taps_at(&self, t_s: f64) -> Option<Vec<Complex<f64>>> {
        if self.realization.is_empty() {
            return None;
        }
        Some(
            self.paths
                .iter()
                .zip(&self.realization)
                .map(|(path, process)| process.at(t_s) * path.gain)
                .collect(),
        )
    }

    /// Channel seen by bins `0..bins` of an `fft_size`-point FFT at time `t_s`
    /// of the latest pass, using the sample-rounded path delays.
    pub fn bin_response(&self, t_s: f64, fft_size: usize, bins: usize) -> Option<Vec<Complex<f64>>> {
        let taps = self.taps_at(t_s)?;
        Some(
            (0..bins)
                .map(|k| {
                    self.paths
                        .iter()
                        .zip(&taps)
                        .map(|(path, &h)| {
                            let turns = (k * path.delay_samples % fft_size) as f64 / fft_size as f64;
                            h * Complex::from_polar(1.0, -2.0 * PI * turns)
                        })
                        .sum::<Complex<f64>>()
                })
                .collect(),
        )
    }

    /// Draw one instantaneous coefficient per path: `(delay_s, gain · h)`.
    pub fn impulse_response(&mut self) -> Vec<(f64, Complex<f64>)> {
        let mut taps = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let process = FadingProcess::new(self.max_doppler_hz, &mut self.rng);
            taps.push((path.delay_s, process.at(0.0) * path.gain));
        }
        taps
    }

    /// `H(f) = Σ h_i · exp(-j2πf·τ_i)` for the given per-path coefficients.
    pub fn frequency_response(
        &self,
        freqs_hz: &[f64],
        taps: &[Complex<f64>],
    ) -> Result<Vec<Complex<f64>>, ChannelError> {
        if taps.len() != self.paths.len() {
            return Err(ChannelError::TapCount {
                expected: self.paths.len(),
                actual: taps.len(),
            });
        }
        Ok(freqs_hz
            .iter()
            .map(|&f| {
                self.paths
                    .iter()
                    .zip(taps)
                    .map(|(path, &h)| h * Complex::from_polar(1.0, -2.0 * PI * f * path.delay_s))
                    .sum::<Complex<f64>>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn profile(delays_s: Vec<f64>, gains_db: Vec<f64>, doppler: f64) -> ChannelProfile {
        ChannelProfile::new("test", delays_s, gains_db, doppler).expect("profile")
    }

    fn ramp(len: usize) -> Vec<Complex<f64>> {
        (0..len).map(|i| Complex::new(i as f64 + 1.0, -(i as f64))).collect()
    }

    #[test]
    fn static_single_path_is_transparent() {
        let mut line = TappedDelayLine::new(1.0e6, &profile(vec![0.0], vec![0.0], 0.0), 1);
        let input = ramp(32);
        assert_eq!(line.filter(&input), input);
    }

    #[test]
    fn delays_round_to_samples() {
        let p = profile(vec![0.0, 2.0e-6], vec![0.0, -6.0], 0.0);
        let mut line = TappedDelayLine::new(1.0e6, &p, 1);
        assert_eq!(line.paths()[1].delay_samples, 2);

        let input = ramp(8);
        let out = line.filter(&input);
        let gain = 10f64.powf(-6.0 / 20.0);
        assert_eq!(out.len(), input.len());
        assert_eq!(out[1], input[1]);
        let expected = input[5] + input[3] * gain;
        assert!((out[5] - expected).norm() < 1e-12);
    }

    #[test]
    fn fading_has_unit_mean_power() {
        let p = profile(vec![0.0], vec![0.0], 100.0);
        let mut line = TappedDelayLine::new(1.0e5, &p, 11);
        let draws = 4000;
        let power: f64 = (0..draws)
            .map(|_| line.impulse_response()[0].1.norm_sqr())
            .sum::<f64>()
            / draws as f64;
        assert!((power - 1.0).abs() < 0.1, "power {}", power);
    }

    #[test]
    fn doppler_spectrum_is_band_limited() {
        let (fs, fd, len) = (1000.0, 50.0, 4096);
        let mut line = TappedDelayLine::new(fs, &profile(vec![0.0], vec![0.0], fd), 5);
        let h = line.filter(&vec![Complex::new(1.0, 0.0); len]);

        // Hann window keeps leakage out of the tails.
        let mut spectrum: Vec<_> = h
            .iter()
            .enumerate()
            .map(|(n, &v)| v * (0.5 - 0.5 * (2.0 * PI * n as f64 / (len - 1) as f64).cos()))
            .collect();
        FftPlanner::new().plan_fft_forward(len).process(&mut spectrum);

        let freq = |k: usize| {
            let k = if k < len / 2 { k as f64 } else { k as f64 - len as f64 };
            k * fs / len as f64
        };
        let energy = |keep: &dyn Fn(f64) -> bool| -> f64 {
            spectrum
                .iter()
                .enumerate()
                .filter(|(k, _)| keep(freq(*k)))
                .map(|(_, c)| c.norm_sqr())
                .sum()
        };
        let total = energy(&|_| true);
        let beyond = energy(&|f| f.abs() > 1.1 * fd);
        let near_dc = energy(&|f| f.abs() < 1.0);
        assert!(beyond / total < 1e-3, "out-of-band fraction {}", beyond / total);
        assert!(near_dc / total < 0.5, "DC fraction {}", near_dc / total);
    }

    #[test]
    fn bin_response_matches_filtered_impulse() {
        let p = profile(vec![0.0, 3.0e-6], vec![0.0, -6.0], 0.0);
        let mut line = TappedDelayLine::new(1.0e6, &p, 2);
        assert!(line.taps_at(0.0).is_none());

        let mut impulse = vec![Complex::new(0.0, 0.0); 64];
        impulse[0] = Complex::new(1.0, 0.0);
        let mut spectrum = line.filter(&impulse);
        FftPlanner::new().plan_fft_forward(64).process(&mut spectrum);

        let response = line.bin_response(0.0, 64, 64).expect("response");
        for (a, b) in response.iter().zip(&spectrum) {
            assert!((a - b).norm() < 1e-9);
        }
        assert_eq!(line.bin_response(0.0, 64, 10).map(|r| r.len()), Some(10));
    }

    #[test]
    fn frequency_response_sums_paths() {
        let p = profile(vec![0.0, 1.0e-6], vec![0.0, 0.0], 0.0);
        let line = TappedDelayLine::new(1.0e6, &p, 1);
        let taps = [Complex::new(1.0, 0.0), Complex::new(1.0, 0.0)];
        let h = line.frequency_response(&[0.0, 5.0e5], &taps).expect("response");
        assert!((h[0] - Complex::new(2.0, 0.0)).norm() < 1e-12);
        assert!(h[1].norm() < 1e-9);
        assert!(line.frequency_response(&[0.0], &taps[..1]).is_err());
    }
}
