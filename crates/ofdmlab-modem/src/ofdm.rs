//! OFDM modulation utilities.

use std::sync::Arc;

use bitvec::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::{zero_forcing, Constellation, DftPrecoder, ModemError, Modulation};

/// Dimensions of one OFDM symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmParams {
    /// IFFT/FFT size `N`.
    pub fft_size: usize,
    /// Data-carrying subcarriers `Nc`, mapped to bins `0..Nc`.
    pub active_subcarriers: usize,
    /// Cyclic prefix length in samples.
    pub cp_len: usize,
    pub modulation: Modulation,
    /// Apply the size-`Nc` DFT precoder (SC-FDM).
    pub sc_fdm: bool,
}

impl OfdmParams {
    pub fn validate(&self) -> Result<(), ModemError> {
        if self.fft_size == 0 || self.active_subcarriers == 0 {
            return Err(ModemError::InvalidDimensions(
                "FFT size and active subcarriers must be non-zero".to_string(),
            ));
        }
        if self.active_subcarriers > self.fft_size {
            return Err(ModemError::InvalidDimensions(format!(
                "{} active subcarriers exceed FFT size {}",
                self.active_subcarriers, self.fft_size
            )));
        }
        if self.cp_len >= self.fft_size {
            return Err(ModemError::InvalidDimensions(format!(
                "cyclic prefix {} must be shorter than FFT size {}",
                self.cp_len, self.fft_size
            )));
        }
        Ok(())
    }

    /// Samples per OFDM symbol including the cyclic prefix.
    pub fn samples_per_symbol(&self) -> usize {
        self.fft_size + self.cp_len
    }

    /// Payload bits carried by one OFDM symbol.
    pub fn bits_per_ofdm_symbol(&self) -> usize {
        self.active_subcarriers * self.modulation.bits_per_symbol()
    }
}

/// Output of [`OfdmTransceiver::modulate_stream`].
#[derive(Debug, Clone, Default)]
pub struct ModulatedStream {
    /// Serialized time-domain samples, `num_ofdm_symbols * (N + cp_len)` long.
    pub signal: Vec<Complex<f64>>,
    /// Constellation symbols before precoding, including frame padding.
    pub symbols: Vec<Complex<f64>>,
    pub num_ofdm_symbols: usize,
}

/// OFDM (or SC-FDM) modulator and demodulator sharing one set of FFT plans.
#[derive(Clone)]
pub struct OfdmTransceiver {
    params: OfdmParams,
    constellation: Constellation,
    ifft: Arc<dyn Fft<f64>>,
    fft: Arc<dyn Fft<f64>>,
    precoder: Option<DftPrecoder>,
}

impl OfdmTransceiver {
    pub fn new(params: OfdmParams) -> Result<Self, ModemError> {
        params.validate()?;
        let mut planner = FftPlanner::<f64>::new();
        let precoder = params
            .sc_fdm
            .then(|| DftPrecoder::new(params.active_subcarriers));
        Ok(Self {
            params,
            constellation: Constellation::new(params.modulation),
            ifft: planner.plan_fft_inverse(params.fft_size),
            fft: planner.plan_fft_forward(params.fft_size),
            precoder,
        })
    }

    pub fn params(&self) -> &OfdmParams {
        &self.params
    }

    pub fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    /// Modulate one OFDM symbol.
    ///
    /// Up to `Nc` constellation symbols are placed on bins `0..Nc` (zero-filled
    /// when fewer are given), optionally DFT-precoded first. The output is the
    /// `N`-sample time-domain block scaled by `1/sqrt(N)` with the last `cp_len`
    /// samples prepended.
    pub fn modulate(&self, data: &[Complex<f64>]) -> Result<Vec<Complex<f64>>, ModemError> {
        let nc = self.params.active_subcarriers;
        let nfft = self.params.fft_size;
        let cp_len = self.params.cp_len;
        if data.len() > nc {
            return Err(ModemError::LengthMismatch {
                expected: nc,
                actual: data.len(),
            });
        }

        let mut freq_bins = vec![Complex::new(0.0, 0.0); nfft];
        freq_bins[..data.len()].copy_from_slice(data);
        if let Some(precoder) = &self.precoder {
            precoder.precode(&mut freq_bins[..nc])?;
        }

        self.ifft.process(&mut freq_bins);

        // rustfft's inverse is unscaled.
        let scale = 1.0 / (nfft as f64).sqrt();
        for bin in &mut freq_bins {
            *bin *= scale;
        }

        let mut with_cp = Vec::with_capacity(nfft + cp_len);
        with_cp.extend_from_slice(&freq_bins[nfft - cp_len..]);
        with_cp.extend_from_slice(&freq_bins);
        Ok(with_cp)
    }

    /// Demodulate one OFDM symbol and return its `Nc` data subcarriers.
    ///
    /// A chunk shorter than `N + cp_len` is zero-padded; extra samples are ignored.
    pub fn demodulate(&self, chunk: &[Complex<f64>]) -> Result<Vec<Complex<f64>>, ModemError> {
        self.demodulate_inner(chunk, None)
    }

    /// Like [`demodulate`](Self::demodulate), zero-forcing each subcarrier
    /// against `response` (one coefficient per data bin) before despreading.
    pub fn demodulate_equalized(
        &self,
        chunk: &[Complex<f64>],
        response: &[Complex<f64>],
    ) -> Result<Vec<Complex<f64>>, ModemError> {
        self.demodulate_inner(chunk, Some(response))
    }

    fn demodulate_inner(
        &self,
        chunk: &[Complex<f64>],
        response: Option<&[Complex<f64>]>,
    ) -> Result<Vec<Complex<f64>>, ModemError> {
        let nfft = self.params.fft_size;
        let cp_len = self.params.cp_len;
        let nc = self.params.active_subcarriers;

        let mut block = vec![Complex::new(0.0, 0.0); nfft];
        let body = chunk.get(cp_len..).unwrap_or(&[]);
        let take = body.len().min(nfft);
        block[..take].copy_from_slice(&body[..take]);

        self.fft.process(&mut block);

        let scale = 1.0 / (nfft as f64).sqrt();
        let mut data: Vec<Complex<f64>> = block[..nc].iter().map(|&bin| bin * scale).collect();
        if let Some(response) = response {
            zero_forcing(&mut data, response)?;
        }
        if let Some(precoder) = &self.precoder {
            precoder.decode(&mut data)?;
        }
        Ok(data)
    }

    /// Modulate as many OFDM symbols as needed to carry `bits`.
    ///
    /// The last symbol is completed with zero bits.
    pub fn modulate_stream(&self, bits: &BitSlice) -> Result<ModulatedStream, ModemError> {
        let per_symbol = self.params.bits_per_ofdm_symbol();
        let num_ofdm_symbols = bits.len().div_ceil(per_symbol);

        let mut padded = bits.to_bitvec();
        padded.resize(num_ofdm_symbols * per_symbol, false);

        let mut stream = ModulatedStream {
            signal: Vec::with_capacity(num_ofdm_symbols * self.params.samples_per_symbol()),
            symbols: Vec::with_capacity(num_ofdm_symbols * self.params.active_subcarriers),
            num_ofdm_symbols,
        };
        for chunk in padded.chunks(per_symbol) {
            let symbols = self.constellation.encode(chunk);
            stream.signal.extend(self.modulate(&symbols)?);
            stream.symbols.extend(symbols);
        }
        Ok(stream)
    }

    /// Demodulate every OFDM symbol in `signal`, zero-padding a trailing partial one.
    pub fn demodulate_stream(&self, signal: &[Complex<f64>]) -> Result<Vec<Complex<f64>>, ModemError> {
        let per_symbol = self.params.samples_per_symbol();
        let mut out = Vec::with_capacity(
            signal.len().div_ceil(per_symbol) * self.params.active_subcarriers,
        );
        for chunk in signal.chunks(per_symbol) {
            out.extend(self.demodulate(chunk)?);
        }
        Ok(out)
    }

    /// Demodulate `signal` with one channel response per OFDM symbol.
    pub fn demodulate_stream_equalized(
        &self,
        signal: &[Complex<f64>],
        responses: &[Vec<Complex<f64>>],
    ) -> Result<Vec<Complex<f64>>, ModemError> {
        let per_symbol = self.params.samples_per_symbol();
        let num_symbols = signal.len().div_ceil(per_symbol);
        if responses.len() != num_symbols {
            return Err(ModemError::LengthMismatch {
                expected: num_symbols,
                actual: responses.len(),
            });
        }
        let mut out = Vec::with_capacity(num_symbols * self.params.active_subcarriers);
        for (chunk, response) in signal.chunks(per_symbol).zip(responses) {
            out.extend(self.demodulate_equalized(chunk, response)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(modulation: Modulation, sc_fdm: bool) -> OfdmParams {
        OfdmParams {
            fft_size: 512,
            active_subcarriers: 300,
            cp_len: 40,
            modulation,
            sc_fdm,
        }
    }

    fn pattern_bits(len: usize) -> BitVec {
        (0..len).map(|i| (i * 7 + i / 3) % 5 < 2).collect()
    }

    #[test]
    fn rejects_invalid_dimensions() {
        let mut p = params(Modulation::Qpsk, false);
        p.active_subcarriers = 600;
        assert!(matches!(
            OfdmTransceiver::new(p),
            Err(ModemError::InvalidDimensions(_))
        ));
        let mut p = params(Modulation::Qpsk, false);
        p.cp_len = 512;
        assert!(OfdmTransceiver::new(p).is_err());
    }

    #[test]
    fn modulator_rejects_too_many_symbols() {
        let modem = OfdmTransceiver::new(params(Modulation::Qpsk, false)).expect("new");
        let data = vec![Complex::new(1.0, 0.0); 301];
        assert!(modem.modulate(&data).is_err());
    }

    #[test]
    fn modulator_zero_input_is_zero_output() {
        let modem = OfdmTransceiver::new(params(Modulation::Qpsk, false)).expect("new");
        let data = vec![Complex::new(0.0, 0.0); 300];
        let out = modem.modulate(&data).expect("modulate");
        assert_eq!(out.len(), 512 + 40);
        assert!(out.iter().all(|v| v.re == 0.0 && v.im == 0.0));
    }

    #[test]
    fn cyclic_prefix_repeats_block_tail() {
        for sc_fdm in [false, true] {
            let modem = OfdmTransceiver::new(params(Modulation::Qam16, sc_fdm)).expect("new");
            let stream = modem.modulate_stream(&pattern_bits(1200)).expect("modulate");
            let sym = &stream.signal[..552];
            assert_eq!(&sym[..40], &sym[512..552]);
        }
    }

    #[test]
    fn equalizer_undoes_delay_spread_within_prefix() {
        // Two paths, the second 5 samples late: y[n] = a·x[n] + b·x[n-5].
        let (a, b, delay) = (Complex::new(0.6, -0.2), Complex::new(-0.3, 0.4), 5);
        for sc_fdm in [false, true] {
            let modem = OfdmTransceiver::new(params(Modulation::Qam64, sc_fdm)).expect("new");
            let stream = modem.modulate_stream(&pattern_bits(3600)).expect("modulate");
            let faded: Vec<_> = (0..stream.signal.len())
                .map(|n| {
                    let late = n
                        .checked_sub(delay)
                        .map_or(Complex::new(0.0, 0.0), |m| stream.signal[m]);
                    a * stream.signal[n] + b * late
                })
                .collect();

            let response: Vec<_> = (0..300)
                .map(|k| {
                    let phase = -2.0 * std::f64::consts::PI * (k * delay) as f64 / 512.0;
                    a + b * Complex::from_polar(1.0, phase)
                })
                .collect();
            let responses = vec![response; stream.num_ofdm_symbols];
            let rx = modem
                .demodulate_stream_equalized(&faded, &responses)
                .expect("demodulate");
            for (r, t) in rx.iter().zip(&stream.symbols) {
                assert!((r - t).norm() < 1e-9, "sc_fdm={sc_fdm}");
            }

            let plain = modem.demodulate_stream(&faded).expect("demodulate");
            assert!(plain.iter().zip(&stream.symbols).any(|(r, t)| (r - t).norm() > 0.1));
            assert!(modem.demodulate_stream_equalized(&faded, &responses[1..]).is_err());
        }
    }

    #[test]
    fn stream_is_frame_aligned() {
        let modem = OfdmTransceiver::new(params(Modulation::Qpsk, false)).expect("new");
        let stream = modem.modulate_stream(&pattern_bits(1000)).expect("modulate");
        assert_eq!(stream.num_ofdm_symbols, 2);
        assert_eq!(stream.signal.len(), 2 * 552);
        assert_eq!(stream.symbols.len(), 600);
    }

    #[test]
    fn noiseless_round_trip() {
        for modulation in Modulation::ALL {
            for sc_fdm in [false, true] {
                let modem = OfdmTransceiver::new(params(modulation, sc_fdm)).expect("new");
                let bits = pattern_bits(2500);
                let stream = modem.modulate_stream(&bits).expect("modulate");
                let rx = modem.demodulate_stream(&stream.signal).expect("demodulate");
                assert_eq!(rx.len(), stream.symbols.len());
                let mut decoded = modem.constellation().decode(&rx);
                decoded.truncate(bits.len());
                assert_eq!(decoded, bits, "{} sc_fdm={}", modulation, sc_fdm);
            }
        }
    }

    #[test]
    fn short_chunk_is_zero_padded() {
        let modem = OfdmTransceiver::new(params(Modulation::Qpsk, false)).expect("new");
        let out = modem.demodulate(&[Complex::new(1.0, 0.0); 10]).expect("demodulate");
        assert_eq!(out.len(), 300);
        assert!(out.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn empty_stream_has_no_symbols() {
        let modem = OfdmTransceiver::new(params(Modulation::Qpsk, true)).expect("new");
        let stream = modem.modulate_stream(BitSlice::empty()).expect("modulate");
        assert_eq!(stream.num_ofdm_symbols, 0);
        assert!(stream.signal.is_empty());
        assert!(modem.demodulate_stream(&[]).expect("demodulate").is_empty());
    }
}
