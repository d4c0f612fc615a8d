//! Square M-QAM constellations with unit average energy.

use bitvec::prelude::*;
use rustfft::num_complex::Complex;

use crate::Modulation;

/// Ordered point set for one modulation scheme.
///
/// Point `i` carries the bit pattern of `i` written MSB first with
/// `bits_per_symbol` bits.
#[derive(Debug, Clone, PartialEq)]
pub struct Constellation {
    modulation: Modulation,
    points: Vec<Complex<f64>>,
}

impl Constellation {
    pub fn new(modulation: Modulation) -> Self {
        Self {
            modulation,
            points: square_grid(modulation.order()),
        }
    }

    pub fn modulation(&self) -> Modulation {
        self.modulation
    }

    pub fn bits_per_symbol(&self) -> usize {
        self.modulation.bits_per_symbol()
    }

    pub fn points(&self) -> &[Complex<f64>] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<Complex<f64>> {
        self.points.get(index).copied()
    }

    /// Map bits to constellation points.
    ///
    /// A trailing group shorter than `bits_per_symbol` is padded with zero bits
    /// on the right.
    pub fn encode(&self, bits: &BitSlice) -> Vec<Complex<f64>> {
        let width = self.bits_per_symbol();
        bits.chunks(width)
            .map(|chunk| {
                let index = chunk
                    .iter()
                    .by_vals()
                    .fold(0usize, |acc, bit| (acc << 1) | bit as usize);
                self.points[index << (width - chunk.len())]
            })
            .collect()
    }

    /// Map received symbols back to bits through the nearest point.
    pub fn decode(&self, symbols: &[Complex<f64>]) -> BitVec {
        let width = self.bits_per_symbol();
        let mut bits = BitVec::with_capacity(symbols.len() * width);
        for &symbol in symbols {
            let index = self.nearest_index(symbol);
            for shift in (0..width).rev() {
                bits.push((index >> shift) & 1 == 1);
            }
        }
        bits
    }

    /// Index of the closest point. Ties go to the lowest index.
    pub fn nearest_index(&self, symbol: Complex<f64>) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, point) in self.points.iter().enumerate() {
            let dist = (symbol - point).norm_sqr();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }
}

fn square_grid(order: usize) -> Vec<Complex<f64>> {
    let side = (order as f64).sqrt().round() as usize;
    let levels: Vec<f64> = (0..side)
        .map(|i| (2 * i) as f64 - (side - 1) as f64)
        .collect();

    let mut points = Vec::with_capacity(side * side);
    for &re in &levels {
        for &im in &levels {
            points.push(Complex::new(re, im));
        }
    }

    let energy = points.iter().map(|p| p.norm_sqr()).sum::<f64>() / points.len() as f64;
    if energy > 0.0 {
        let scale = energy.sqrt();
        for point in &mut points {
            *point /= scale;
        }
    }
    points
}
