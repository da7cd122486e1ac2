//! FFT plan management on top of rustfft and realfft.
//!
//! The streaming engine owns its forward/inverse plan pair for the life of
//! the filter; this module hands those plans out and keeps the real-input
//! path used for spectrum inspection.

use crate::error::{FilterError, FilterResult};
use num_complex::Complex64;
use realfft::RealFftPlanner;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// FFT engine with cached planners.
pub struct FftEngine {
    /// Complex FFT planner.
    complex_planner: FftPlanner<f64>,

    /// Real FFT planner.
    real_planner: RealFftPlanner<f64>,
}

impl FftEngine {
    /// Create a new FFT engine.
    pub fn new() -> Self {
        Self {
            complex_planner: FftPlanner::new(),
            real_planner: RealFftPlanner::new(),
        }
    }

    /// Get a cached forward FFT plan.
    ///
    /// Plans work for any length; rustfft falls back to mixed-radix and
    /// Bluestein internally, so callers never need to round up to a power
    /// of two.
    pub fn get_fft_forward(&mut self, len: usize) -> Arc<dyn Fft<f64>> {
        self.complex_planner.plan_fft_forward(len)
    }

    /// Get a cached inverse FFT plan.
    ///
    /// rustfft inverse plans are unnormalized: a forward/inverse round trip
    /// scales the signal by `len`, and the caller divides it back out.
    pub fn get_fft_inverse(&mut self, len: usize) -> Arc<dyn Fft<f64>> {
        self.complex_planner.plan_fft_inverse(len)
    }

    /// Perform forward real-to-complex FFT.
    ///
    /// Input: N real samples
    /// Output: N/2 + 1 complex samples (Hermitian symmetry exploited)
    pub fn rfft(&mut self, data: &[f64]) -> FilterResult<Vec<Complex64>> {
        let r2c = self.real_planner.plan_fft_forward(data.len());
        let mut input = data.to_vec();
        let mut output = r2c.make_output_vec();

        r2c.process(&mut input, &mut output)
            .map_err(|e| FilterError::Transform(e.to_string()))?;

        Ok(output)
    }
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the magnitude spectrum of a signal.
pub fn magnitude_spectrum(signal: &[f64]) -> FilterResult<Vec<f64>> {
    let mut engine = FftEngine::new();
    let spectrum = engine.rfft(signal)?;
    Ok(spectrum.iter().map(|c| c.norm()).collect())
}
