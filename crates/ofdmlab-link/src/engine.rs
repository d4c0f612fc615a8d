//! The link simulation engine: single transmissions, BER/SER sweeps and
//! PAPR collection.
//!
//! A [`LinkEngine`] owns one immutable [`LinkConfig`] and the transceiver,
//! detector and channel derived from it. Switching modulation, precoding or
//! channel builds the replacement state first and swaps it in only once every
//! piece has been constructed, so a failed switch leaves the engine as it was.

use std::time::{Duration, Instant};

use bitvec::prelude::*;
use ofdmlab_channel::{Channel, ChannelKind};
use ofdmlab_modem::{
    bit_errors, symbol_errors, Complex, Modulation, OfdmTransceiver, SymbolDetector,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ChannelConfig, LinkConfig};
use crate::papr::{self, PaprStats};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::stats::{self, SampleSummary};
use crate::LinkError;

/// SNR the channel starts at before the first transmission sets it.
const INITIAL_SNR_DB: f64 = 10.0;
const CONFIDENCE: f64 = 0.95;

/// Outcome of one pass through the link.
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionResult {
    pub modulation: Modulation,
    pub sc_fdm: bool,
    /// Whether subcarriers were zero-forced against the channel response.
    pub equalized: bool,
    pub snr_db: f64,
    pub n_bits: usize,
    pub errors: usize,
    pub ber: f64,
    pub symbol_errors: usize,
    pub ser: f64,
    pub noise_power: Option<f64>,
    pub num_ofdm_symbols: usize,
    pub papr_per_symbol: PaprStats,
    /// PAPR of each OFDM symbol in dB.
    pub papr_db: Vec<f64>,
    pub transmission_time: Duration,
    #[serde(skip)]
    pub bits_tx: BitVec,
    #[serde(skip)]
    pub bits_rx: BitVec,
    #[serde(skip)]
    pub transmitted_symbols: Vec<Complex<f64>>,
    #[serde(skip)]
    pub received_symbols: Vec<Complex<f64>>,
    #[serde(skip)]
    pub detected_symbols: Vec<Complex<f64>>,
    #[serde(skip)]
    pub signal_tx: Vec<Complex<f64>>,
    #[serde(skip)]
    pub signal_rx: Vec<Complex<f64>>,
}

/// Per-SNR error statistics for one modulation.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub modulation: Modulation,
    pub sc_fdm: bool,
    pub channel: ChannelKind,
    pub snr_db: Vec<f64>,
    pub n_bits: usize,
    pub n_iterations: usize,
    pub ber_mean: Vec<f64>,
    pub ber_std: Vec<f64>,
    pub ber_ci_lower: Vec<f64>,
    pub ber_ci_upper: Vec<f64>,
    pub ser_mean: Vec<f64>,
    pub ser_std: Vec<f64>,
    /// `ber_runs[i][k]` is iteration `k` at `snr_db[i]`.
    pub ber_runs: Vec<Vec<f64>>,
    pub ser_runs: Vec<Vec<f64>>,
}

impl SweepResult {
    fn new(config: &LinkConfig, channel: ChannelKind, n_bits: usize, n_iterations: usize) -> Self {
        Self {
            modulation: config.modulation(),
            sc_fdm: config.sc_fdm(),
            channel,
            snr_db: Vec::new(),
            n_bits,
            n_iterations,
            ber_mean: Vec::new(),
            ber_std: Vec::new(),
            ber_ci_lower: Vec::new(),
            ber_ci_upper: Vec::new(),
            ser_mean: Vec::new(),
            ser_std: Vec::new(),
            ber_runs: Vec::new(),
            ser_runs: Vec::new(),
        }
    }

    fn push(&mut self, snr_db: f64, ber_runs: Vec<f64>, ser_runs: Vec<f64>) {
        let ber = SampleSummary::from_samples(&ber_runs, CONFIDENCE);
        self.snr_db.push(snr_db);
        self.ber_mean.push(ber.mean);
        self.ber_std.push(ber.std);
        self.ber_ci_lower.push(ber.ci_lower.max(0.0));
        self.ber_ci_upper.push(ber.ci_upper);
        self.ser_mean.push(stats::mean(&ser_runs));
        self.ser_std.push(stats::sample_std(&ser_runs));
        self.ber_runs.push(ber_runs);
        self.ser_runs.push(ser_runs);
    }
}

/// Pooled per-symbol PAPR for one modulation/precoding combination.
#[derive(Debug, Clone, Serialize)]
pub struct PaprCollection {
    pub modulation: Modulation,
    pub sc_fdm: bool,
    pub papr_db: Vec<f64>,
    pub stats: PaprStats,
}

impl PaprCollection {
    /// `P(PAPR > x)` for each threshold.
    pub fn ccdf(&self, thresholds: &[f64]) -> Vec<f64> {
        papr::ccdf(&self.papr_db, thresholds)
    }
}

pub struct LinkEngine {
    config: LinkConfig,
    channel_config: ChannelConfig,
    transceiver: OfdmTransceiver,
    detector: SymbolDetector,
    channel: Channel,
    equalization: bool,
    rng: ChaCha8Rng,
}

impl LinkEngine {
    pub fn new(config: LinkConfig, channel_config: ChannelConfig) -> Result<Self, LinkError> {
        let mut rng = match channel_config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (transceiver, detector) = derive_modem(&config)?;
        let settings = channel_config.resolve(&config, INITIAL_SNR_DB, rng.gen())?;
        let channel = Channel::build(&settings)?;
        debug!(
            fft_size = config.fft_size(),
            active_subcarriers = config.active_subcarriers(),
            cp_length = config.cp_length(),
            modulation = %config.modulation(),
            channel = %channel.kind(),
            "link engine ready"
        );
        Ok(Self {
            config,
            channel_config,
            transceiver,
            detector,
            channel,
            equalization: true,
            rng,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    pub fn transceiver(&self) -> &OfdmTransceiver {
        &self.transceiver
    }

    pub fn detector(&self) -> &SymbolDetector {
        &self.detector
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn equalization(&self) -> bool {
        self.equalization
    }

    /// Enable or disable zero-forcing against the known channel response.
    /// Only multipath channels are affected. On by default.
    pub fn set_equalization(&mut self, enabled: bool) {
        self.equalization = enabled;
    }

    /// Switch to `config`, rebuilding the channel only if the sample rate moved.
    pub fn reconfigure(&mut self, config: LinkConfig) -> Result<(), LinkError> {
        let (transceiver, detector) = derive_modem(&config)?;
        let channel = if config.sample_rate_hz() != self.config.sample_rate_hz()
            && self.channel.kind() == ChannelKind::RayleighMultipath
        {
            let snr_db = self.channel.snr_info().snr_db;
            let settings = self.channel_config.resolve(&config, snr_db, self.rng.gen())?;
            Some(Channel::build(&settings)?)
        } else {
            None
        };

        self.config = config;
        self.transceiver = transceiver;
        self.detector = detector;
        if let Some(channel) = channel {
            self.channel = channel;
        }
        Ok(())
    }

    pub fn set_modulation(&mut self, modulation: Modulation) -> Result<(), LinkError> {
        self.reconfigure(self.config.with_modulation(modulation))
    }

    pub fn set_sc_fdm(&mut self, enabled: bool) -> Result<(), LinkError> {
        self.reconfigure(self.config.with_sc_fdm(enabled))
    }

    /// Replace the channel. The current SNR carries over.
    pub fn apply_channel(&mut self, channel_config: ChannelConfig) -> Result<(), LinkError> {
        let snr_db = self.channel.snr_info().snr_db;
        let settings = channel_config.resolve(&self.config, snr_db, self.rng.gen())?;
        let channel = Channel::build(&settings)?;
        debug!(channel = %channel.kind(), profile = ?channel_config.profile, "channel replaced");
        self.channel = channel;
        self.channel_config = channel_config;
        Ok(())
    }

    /// Uniformly random bits from the engine's generator.
    pub fn random_bits(&mut self, n: usize) -> BitVec {
        (0..n).map(|_| self.rng.gen::<bool>()).collect()
    }

    /// Push `bits` through modulator, channel, demodulator and detector.
    ///
    /// The recovered bits are truncated or zero-padded to `bits.len()` so frame
    /// padding never shows up in the error count.
    pub fn transmit(&mut self, bits: &BitSlice, snr_db: f64) -> Result<TransmissionResult, LinkError> {
        let start = Instant::now();
        self.channel.set_snr(snr_db);

        let stream = self.transceiver.modulate_stream(bits)?;
        let papr_db = papr::papr_per_symbol(&stream.signal, self.config.samples_per_symbol());

        let output = self.channel.transmit(&stream.signal)?;
        let responses = self.channel_responses(output.received.len());
        let equalized = responses.is_some();
        let received_symbols = match &responses {
            Some(responses) => self
                .transceiver
                .demodulate_stream_equalized(&output.received, responses)?,
            None => self.transceiver.demodulate_stream(&output.received)?,
        };
        let detected_symbols = self.detector.detect_batch(&received_symbols);

        let mut bits_rx = self.detector.constellation().decode(&received_symbols);
        bits_rx.resize(bits.len(), false);
        let errors = bit_errors(bits, &bits_rx)?;
        let ber = if bits.is_empty() {
            0.0
        } else {
            errors as f64 / bits.len() as f64
        };

        let common = stream.symbols.len().min(detected_symbols.len());
        let symbol_errors = symbol_errors(&stream.symbols[..common], &detected_symbols[..common])?;
        let ser = if common == 0 {
            0.0
        } else {
            symbol_errors as f64 / common as f64
        };

        let papr_stats = PaprStats::from_values(&papr_db);
        let noise_power = self.channel.snr_info().noise_power;
        debug!(
            snr_db,
            n_bits = bits.len(),
            errors,
            ber,
            papr_mean = papr_stats.mean,
            "transmission complete"
        );

        Ok(TransmissionResult {
            modulation: self.config.modulation(),
            sc_fdm: self.config.sc_fdm(),
            equalized,
            snr_db,
            n_bits: bits.len(),
            errors,
            ber,
            symbol_errors,
            ser,
            noise_power,
            num_ofdm_symbols: stream.num_ofdm_symbols,
            papr_per_symbol: papr_stats,
            papr_db,
            transmission_time: start.elapsed(),
            bits_tx: bits.to_bitvec(),
            bits_rx,
            transmitted_symbols: stream.symbols,
            received_symbols,
            detected_symbols,
            signal_tx: stream.signal,
            signal_rx: output.received,
        })
    }

    /// Monte-Carlo BER/SER over `snr_range`.
    ///
    /// With `bits` given every iteration resends that sequence, otherwise each
    /// iteration draws `num_bits` fresh random bits.
    pub fn run_ber_sweep(
        &mut self,
        num_bits: usize,
        snr_range: &[f64],
        n_iterations: usize,
        bits: Option<&BitSlice>,
        progress: &mut dyn ProgressSink,
    ) -> Result<SweepResult, LinkError> {
        check_iterations(n_iterations)?;
        let mut tracker = ProgressTracker::new(progress, snr_range.len() * n_iterations);
        self.sweep(num_bits, snr_range, n_iterations, bits, &mut tracker)
    }

    /// [`run_ber_sweep`](Self::run_ber_sweep) once per modulation.
    ///
    /// The engine's configuration is restored afterwards, also when a sweep fails.
    pub fn run_ber_sweep_all_modulations(
        &mut self,
        num_bits: usize,
        snr_range: &[f64],
        n_iterations: usize,
        bits: Option<&BitSlice>,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<SweepResult>, LinkError> {
        check_iterations(n_iterations)?;
        let original = self.config.clone();
        let total = Modulation::ALL.len() * snr_range.len() * n_iterations;
        let mut tracker = ProgressTracker::new(progress, total);

        let outcome = self.sweep_each_modulation(num_bits, snr_range, n_iterations, bits, &mut tracker);
        let restored = self.reconfigure(original);
        let results = outcome?;
        restored?;
        tracker.announce("Sweep complete");
        Ok(results)
    }

    /// Pool per-symbol PAPR over `n_transmissions` random payloads for every
    /// modulation with and without SC-FDM precoding.
    pub fn collect_papr_for_all_modulations(
        &mut self,
        num_bits: usize,
        n_transmissions: usize,
        snr_db: f64,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<PaprCollection>, LinkError> {
        if n_transmissions == 0 {
            return Err(LinkError::InvalidConfig(
                "at least one transmission is required".to_string(),
            ));
        }
        let original = self.config.clone();
        let total = Modulation::ALL.len() * 2 * n_transmissions;
        let mut tracker = ProgressTracker::new(progress, total);

        let outcome = self.collect_papr(num_bits, n_transmissions, snr_db, &mut tracker);
        let restored = self.reconfigure(original);
        let collections = outcome?;
        restored?;
        Ok(collections)
    }

    /// Channel response over the data bins, sampled at the middle of each
    /// OFDM symbol's FFT window. `None` when no equalization applies.
    fn channel_responses(&self, num_samples: usize) -> Option<Vec<Vec<Complex<f64>>>> {
        if !self.equalization {
            return None;
        }
        let per_symbol = self.config.samples_per_symbol();
        let window_mid = self.config.cp_length() + self.config.fft_size() / 2;
        let dt = self.config.sample_period_s();
        (0..num_samples.div_ceil(per_symbol))
            .map(|s| {
                self.channel.bin_response(
                    (s * per_symbol + window_mid) as f64 * dt,
                    self.config.fft_size(),
                    self.config.active_subcarriers(),
                )
            })
            .collect()
    }

    fn sweep_each_modulation(
        &mut self,
        num_bits: usize,
        snr_range: &[f64],
        n_iterations: usize,
        bits: Option<&BitSlice>,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Vec<SweepResult>, LinkError> {
        let mut results = Vec::with_capacity(Modulation::ALL.len());
        for modulation in Modulation::ALL {
            self.set_modulation(modulation)?;
            tracker.announce(&format!("Modulation: {modulation}"));
            results.push(self.sweep(num_bits, snr_range, n_iterations, bits, tracker)?);
        }
        Ok(results)
    }

    fn sweep(
        &mut self,
        num_bits: usize,
        snr_range: &[f64],
        n_iterations: usize,
        bits: Option<&BitSlice>,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<SweepResult, LinkError> {
        let n_bits = bits.map_or(num_bits, |b| b.len());
        let modulation = self.config.modulation();
        info!(
            %modulation,
            sc_fdm = self.config.sc_fdm(),
            points = snr_range.len(),
            n_iterations,
            n_bits,
            "BER sweep started"
        );

        let mut result = SweepResult::new(&self.config, self.channel.kind(), n_bits, n_iterations);
        for &snr_db in snr_range {
            let mut ber_runs = Vec::with_capacity(n_iterations);
            let mut ser_runs = Vec::with_capacity(n_iterations);
            for iteration in 1..=n_iterations {
                let outcome = match bits {
                    Some(fixed) => self.transmit(fixed, snr_db)?,
                    None => {
                        let payload = self.random_bits(num_bits);
                        self.transmit(&payload, snr_db)?
                    }
                };
                ber_runs.push(outcome.ber);
                ser_runs.push(outcome.ser);
                tracker.step(&format!(
                    "{modulation} - SNR: {snr_db:.1} dB, Iter: {iteration}/{n_iterations}"
                ));
            }
            result.push(snr_db, ber_runs, ser_runs);
        }

        info!(%modulation, "BER sweep finished");
        Ok(result)
    }

    fn collect_papr(
        &mut self,
        num_bits: usize,
        n_transmissions: usize,
        snr_db: f64,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Vec<PaprCollection>, LinkError> {
        let mut collections = Vec::with_capacity(Modulation::ALL.len() * 2);
        for modulation in Modulation::ALL {
            for sc_fdm in [false, true] {
                self.reconfigure(self.config.with_modulation(modulation).with_sc_fdm(sc_fdm))?;
                let label = if sc_fdm { "SC-FDM" } else { "OFDM" };
                let mut pooled = Vec::new();
                for i in 1..=n_transmissions {
                    let payload = self.random_bits(num_bits);
                    pooled.extend(self.transmit(&payload, snr_db)?.papr_db);
                    tracker.step(&format!("PAPR {modulation} {label}: {i}/{n_transmissions}"));
                }
                let stats = PaprStats::from_values(&pooled);
                info!(%modulation, sc_fdm, mean_db = stats.mean, "PAPR collected");
                collections.push(PaprCollection {
                    modulation,
                    sc_fdm,
                    papr_db: pooled,
                    stats,
                });
            }
        }
        Ok(collections)
    }
}

fn derive_modem(config: &LinkConfig) -> Result<(OfdmTransceiver, SymbolDetector), LinkError> {
    let transceiver = OfdmTransceiver::new(config.ofdm_params())?;
    let detector = SymbolDetector::new(transceiver.constellation().clone());
    Ok((transceiver, detector))
}

fn check_iterations(n_iterations: usize) -> Result<(), LinkError> {
    if n_iterations == 0 {
        return Err(LinkError::InvalidConfig(
            "at least one iteration is required".to_string(),
        ));
    }
    Ok(())
}
