//! DFT spreading for SC-FDM.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::ModemError;

/// Unitary size-`M` DFT applied to the data symbols before subcarrier mapping.
///
/// `precode` is the forward transform and `decode` its inverse, both scaled by
/// `1/sqrt(M)` so symbol energy is preserved.
#[derive(Clone)]
pub struct DftPrecoder {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl DftPrecoder {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spread `symbols` in place.
    pub fn precode(&self, symbols: &mut [Complex<f64>]) -> Result<(), ModemError> {
        self.check_len(symbols)?;
        self.forward.process(symbols);
        self.normalize(symbols);
        Ok(())
    }

    /// Undo `precode` in place.
    pub fn decode(&self, symbols: &mut [Complex<f64>]) -> Result<(), ModemError> {
        self.check_len(symbols)?;
        self.inverse.process(symbols);
        self.normalize(symbols);
        Ok(())
    }

    fn check_len(&self, symbols: &[Complex<f64>]) -> Result<(), ModemError> {
        if symbols.len() != self.size {
            return Err(ModemError::LengthMismatch {
                expected: self.size,
                actual: symbols.len(),
            });
        }
        Ok(())
    }

    fn normalize(&self, symbols: &mut [Complex<f64>]) {
        let scale = 1.0 / (self.size as f64).sqrt();
        for s in symbols {
            *s *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_undoes_precode() {
        let precoder = DftPrecoder::new(12);
        let original: Vec<Complex<f64>> = (0..12)
            .map(|i| Complex::new(i as f64 * 0.5 - 2.0, 1.0 - i as f64 * 0.25))
            .collect();
        let mut buf = original.clone();
        precoder.precode(&mut buf).expect("precode");
        precoder.decode(&mut buf).expect("decode");
        for (a, b) in buf.iter().zip(&original) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn precode_preserves_energy() {
        let precoder = DftPrecoder::new(300);
        let mut buf: Vec<Complex<f64>> = (0..300)
            .map(|i| if i % 3 == 0 { Complex::new(1.0, -1.0) } else { Complex::new(-1.0, 0.0) })
            .collect();
        let before: f64 = buf.iter().map(|s| s.norm_sqr()).sum();
        precoder.precode(&mut buf).expect("precode");
        let after: f64 = buf.iter().map(|s| s.norm_sqr()).sum();
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn rejects_wrong_length() {
        let precoder = DftPrecoder::new(8);
        let mut buf = vec![Complex::new(1.0, 0.0); 4];
        assert_eq!(
            precoder.precode(&mut buf),
            Err(ModemError::LengthMismatch { expected: 8, actual: 4 })
        );
    }
}
