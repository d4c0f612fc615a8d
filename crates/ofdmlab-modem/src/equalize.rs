//! One-tap frequency-domain equalization.

use rustfft::num_complex::Complex;

use crate::ModemError;

/// Bins weaker than this are treated as nulled and zeroed.
const MIN_BIN_POWER: f64 = 1.0e-12;

/// Zero-forcing: divide every subcarrier by its channel coefficient.
pub fn zero_forcing(symbols: &mut [Complex<f64>], response: &[Complex<f64>]) -> Result<(), ModemError> {
    if symbols.len() != response.len() {
        return Err(ModemError::LengthMismatch {
            expected: symbols.len(),
            actual: response.len(),
        });
    }
    for (s, &h) in symbols.iter_mut().zip(response) {
        let power = h.norm_sqr();
        *s = if power > MIN_BIN_POWER {
            *s * h.conj() / power
        } else {
            Complex::new(0.0, 0.0)
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divides_out_the_channel() {
        let data = [Complex::new(1.0, -1.0), Complex::new(-0.5, 2.0)];
        let h = [Complex::new(0.3, 0.4), Complex::new(-2.0, 1.0)];
        let mut rx: Vec<_> = data.iter().zip(&h).map(|(d, h)| d * h).collect();
        zero_forcing(&mut rx, &h).expect("equalize");
        for (a, b) in rx.iter().zip(&data) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn nulled_bins_are_zeroed() {
        let mut rx = [Complex::new(1.0, 1.0)];
        zero_forcing(&mut rx, &[Complex::new(0.0, 0.0)]).expect("equalize");
        assert_eq!(rx[0], Complex::new(0.0, 0.0));
    }

    #[test]
    fn length_mismatch() {
        let mut rx = [Complex::new(1.0, 0.0); 3];
        assert_eq!(
            zero_forcing(&mut rx, &[Complex::new(1.0, 0.0); 2]),
            Err(ModemError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
}
