//! Peak-to-average power ratio of time-domain OFDM frames.

use ofdmlab_modem::Complex;
use serde::Serialize;

use crate::stats;

/// PAPR of one segment in dB.
///
/// An all-zero segment has no meaningful ratio and reports 0 dB.
pub fn papr_db(segment: &[Complex<f64>]) -> f64 {
    if segment.is_empty() {
        return 0.0;
    }
    let mut peak = 0.0f64;
    let mut total = 0.0;
    for s in segment {
        let p = s.norm_sqr();
        peak = peak.max(p);
        total += p;
    }
    let average = total / segment.len() as f64;
    if average <= 0.0 {
        return 0.0;
    }
    (10.0 * (peak / average).log10()).max(0.0)
}

/// PAPR of every complete frame of `samples_per_symbol` samples.
pub fn papr_per_symbol(signal: &[Complex<f64>], samples_per_symbol: usize) -> Vec<f64> {
    if samples_per_symbol == 0 {
        return Vec::new();
    }
    signal.chunks_exact(samples_per_symbol).map(papr_db).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PaprStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
    pub num_symbols: usize,
}

impl PaprStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            mean: stats::mean(values),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            std: stats::population_std(values),
            num_symbols: values.len(),
        }
    }
}

/// Fraction of `samples` strictly above each threshold.
pub fn ccdf(samples: &[f64], thresholds: &[f64]) -> Vec<f64> {
    if samples.is_empty() {
        return vec![0.0; thresholds.len()];
    }
    let n = samples.len() as f64;
    thresholds
        .iter()
        .map(|&x| samples.iter().filter(|&&s| s > x).count() as f64 / n)
        .collect()
}

/// Sorted samples paired with `1 - i/n`.
pub fn empirical_ccdf(samples: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, x)| (x, 1.0 - i as f64 / n))
        .collect()
}

/// Evenly spaced thresholds from `start` up to (excluding) `stop`.
pub fn threshold_grid(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let count = ((stop - start) / step).ceil() as usize;
    (0..count).map(|i| start + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_envelope_is_zero_db() {
        let segment: Vec<_> = (0..16)
            .map(|k| Complex::from_polar(1.0, k as f64 * 0.3))
            .collect();
        assert!(papr_db(&segment).abs() < 1e-9);
    }

    #[test]
    fn single_spike() {
        let mut segment = vec![Complex::new(0.0, 0.0); 10];
        segment[3] = Complex::new(1.0, 0.0);
        assert!((papr_db(&segment) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_segment_reports_zero() {
        assert_eq!(papr_db(&[Complex::new(0.0, 0.0); 8]), 0.0);
        assert_eq!(papr_db(&[]), 0.0);
    }

    #[test]
    fn per_symbol_ignores_trailing_partial() {
        let signal = vec![Complex::new(1.0, 0.0); 25];
        assert_eq!(papr_per_symbol(&signal, 10).len(), 2);
        assert!(papr_per_symbol(&signal, 0).is_empty());
    }

    #[test]
    fn stats_of_values() {
        let stats = PaprStats::from_values(&[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.max, 8.0);
        assert_eq!(stats.min, 2.0);
        assert!((stats.std - 5f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.num_symbols, 4);
        assert_eq!(PaprStats::from_values(&[]), PaprStats::default());
    }

    #[test]
    fn ccdf_counts_exceedances() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(ccdf(&samples, &[0.0, 2.0, 4.0]), vec![1.0, 0.5, 0.0]);
        let curve = empirical_ccdf(&[3.0, 1.0, 2.0]);
        assert_eq!(curve[0].0, 1.0);
        assert_eq!(curve[0].1, 1.0);
        assert!((curve[2].1 - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn grid_spacing() {
        let grid = threshold_grid(0.0, 1.0, 0.25);
        assert_eq!(grid, vec![0.0, 0.25, 0.5, 0.75]);
        assert!(threshold_grid(1.0, 0.0, 0.1).is_empty());
    }
}
