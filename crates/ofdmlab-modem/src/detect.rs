use bitvec::prelude::*;
use rustfft::num_complex::Complex;

use crate::{Constellation, ModemError};

/// Hard-decision minimum-distance detector.
#[derive(Debug, Clone)]
pub struct SymbolDetector {
    constellation: Constellation,
}

impl SymbolDetector {
    pub fn new(constellation: Constellation) -> Self {
        Self { constellation }
    }

    pub fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    /// Return the constellation point closest to `symbol`.
    pub fn detect(&self, symbol: Complex<f64>) -> Complex<f64> {
        self.constellation.points()[self.constellation.nearest_index(symbol)]
    }

    pub fn detect_batch(&self, symbols: &[Complex<f64>]) -> Vec<Complex<f64>> {
        symbols.iter().map(|&s| self.detect(s)).collect()
    }
}

/// Count positions where the two symbol sequences differ.
pub fn symbol_errors(tx: &[Complex<f64>], rx: &[Complex<f64>]) -> Result<usize, ModemError> {
    check_lengths(tx.len(), rx.len())?;
    Ok(tx.iter().zip(rx).filter(|(a, b)| a != b).count())
}

/// Fraction of differing symbols. Empty input has a rate of zero.
pub fn symbol_error_rate(tx: &[Complex<f64>], rx: &[Complex<f64>]) -> Result<f64, ModemError> {
    let errors = symbol_errors(tx, rx)?;
    if tx.is_empty() {
        return Ok(0.0);
    }
    Ok(errors as f64 / tx.len() as f64)
}

/// Count positions where the two bit sequences differ.
pub fn bit_errors(tx: &BitSlice, rx: &BitSlice) -> Result<usize, ModemError> {
    check_lengths(tx.len(), rx.len())?;
    Ok(tx
        .iter()
        .by_vals()
        .zip(rx.iter().by_vals())
        .filter(|(a, b)| a != b)
        .count())
}

fn check_lengths(expected: usize, actual: usize) -> Result<(), ModemError> {
    if expected != actual {
        return Err(ModemError::LengthMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Modulation;

    #[test]
    fn detect_snaps_to_grid() {
        let detector = SymbolDetector::new(Constellation::new(Modulation::Qam64));
        for &point in detector.constellation().points() {
            let noisy = point + Complex::new(0.02, -0.03);
            assert_eq!(detector.detect(noisy), point);
        }
    }

    #[test]
    fn ser_counts_mismatches() {
        let a = Complex::new(1.0, 1.0);
        let b = Complex::new(-1.0, 1.0);
        let ser = symbol_error_rate(&[a, a, b, b], &[a, b, b, a]).expect("ser");
        assert!((ser - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ser_requires_equal_lengths() {
        let a = Complex::new(1.0, 1.0);
        assert_eq!(
            symbol_error_rate(&[a, a], &[a]),
            Err(ModemError::LengthMismatch { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn bit_errors_compare_by_position() {
        assert_eq!(bit_errors(bits![1, 0, 1, 1], bits![1, 1, 1, 0]), Ok(2));
        assert!(bit_errors(bits![1, 0], bits![1]).is_err());
    }
}
