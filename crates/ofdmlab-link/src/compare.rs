//! Side-by-side comparison of channel bandwidths.

use serde::Serialize;
use tracing::info;

use crate::config::{ChannelConfig, LinkConfig, LinkParams, TransmissionMetrics};
use crate::engine::LinkEngine;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::LinkError;

/// One bandwidth's dimensions, error rates and air-time figures.
#[derive(Debug, Clone, Serialize)]
pub struct BandwidthComparison {
    pub bandwidth_mhz: f64,
    pub fft_size: usize,
    pub active_subcarriers: usize,
    pub cp_length: usize,
    pub errors: usize,
    pub ber: f64,
    pub ser: f64,
    pub metrics: TransmissionMetrics,
}

/// Send `num_bits` random bits once at each bandwidth in `bandwidths_mhz`.
///
/// Every other option comes from `params` and `channel`. A seeded channel
/// config gives each bandwidth the same payload.
pub fn compare_bandwidths(
    params: &LinkParams,
    bandwidths_mhz: &[f64],
    channel: &ChannelConfig,
    num_bits: usize,
    snr_db: f64,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<BandwidthComparison>, LinkError> {
    let mut tracker = ProgressTracker::new(progress, bandwidths_mhz.len());
    let mut rows = Vec::with_capacity(bandwidths_mhz.len());
    for &bandwidth_mhz in bandwidths_mhz {
        let config = LinkConfig::from_params(&LinkParams {
            bandwidth_mhz,
            ..params.clone()
        })?;
        let metrics = config.transmission_metrics(num_bits);
        let mut engine = LinkEngine::new(config, channel.clone())?;
        let bits = engine.random_bits(num_bits);
        let result = engine.transmit(&bits, snr_db)?;

        let config = engine.config();
        info!(
            bandwidth_mhz,
            ber = result.ber,
            throughput_mbps = metrics.throughput_mbps,
            "bandwidth compared"
        );
        rows.push(BandwidthComparison {
            bandwidth_mhz,
            fft_size: config.fft_size(),
            active_subcarriers: config.active_subcarriers(),
            cp_length: config.cp_length(),
            errors: result.errors,
            ber: result.ber,
            ser: result.ser,
            metrics,
        });
        tracker.step(&format!("Bandwidth: {bandwidth_mhz} MHz"));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lte_bandwidths;
    use crate::progress::NoProgress;

    #[test]
    fn lte_bandwidths_side_by_side() {
        let bandwidths: Vec<f64> = lte_bandwidths().collect();
        let rows = compare_bandwidths(
            &LinkParams::default(),
            &bandwidths,
            &ChannelConfig::awgn().with_seed(3),
            10_000,
            30.0,
            &mut NoProgress,
        )
        .expect("compare");

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].fft_size, 128);
        assert_eq!(rows[5].active_subcarriers, 1200);
        assert!(rows
            .windows(2)
            .all(|w| w[1].metrics.throughput_mbps > w[0].metrics.throughput_mbps));
        assert!(rows
            .windows(2)
            .all(|w| w[1].metrics.n_ofdm_symbols <= w[0].metrics.n_ofdm_symbols));
        assert!(rows.iter().all(|r| r.ber < 1e-3), "{rows:?}");
    }

    #[test]
    fn bad_bandwidth_is_reported() {
        let err = compare_bandwidths(
            &LinkParams::default(),
            &[5.0, -1.0],
            &ChannelConfig::awgn().with_seed(4),
            1_000,
            10.0,
            &mut NoProgress,
        );
        assert!(matches!(err, Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn empty_list() {
        let rows = compare_bandwidths(
            &LinkParams::default(),
            &[],
            &ChannelConfig::awgn(),
            1_000,
            10.0,
            &mut NoProgress,
        )
        .expect("compare");
        assert!(rows.is_empty());
    }
}
