//! Constellation mapping, OFDM/SC-FDM transceiver and hard-decision detection.

pub mod constellation;
pub mod detect;
pub mod equalize;
pub mod modulation;
pub mod ofdm;
pub mod precoding;

pub use constellation::Constellation;
pub use detect::{bit_errors, symbol_error_rate, symbol_errors, SymbolDetector};
pub use equalize::zero_forcing;
pub use modulation::Modulation;
pub use ofdm::{ModulatedStream, OfdmParams, OfdmTransceiver};
pub use precoding::DftPrecoder;

pub use rustfft::num_complex::Complex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModemError {
    #[error("unsupported modulation: {0}")]
    UnsupportedModulation(String),
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid OFDM dimensions: {0}")]
    InvalidDimensions(String),
}
