//! Streaming block convolution with a power-law memory kernel.
//!
//! The engine filters a signal one fixed-size block at a time through a
//! frequency-domain multiply, carrying each block's convolution tail into
//! the next call (overlap-add). Concatenated block outputs are identical
//! to direct linear convolution of the whole stream, so block boundaries
//! are invisible to the caller.

use crate::error::{FilterError, FilterResult};
use crate::fft::FftEngine;
use crate::kernel::power_law_taps;
use num_complex::Complex64;
use rustfft::Fft;
use std::sync::Arc;

/// Streaming overlap-add convolution engine.
///
/// One instance filters one signal. Instances share nothing and may be
/// driven from separate threads independently.
pub struct StreamConvolver {
    /// Samples consumed and produced per call.
    block_len: usize,

    /// Transform size (always 2 * block_len, so one block of linear
    /// convolution tail fits without wraparound).
    fft_size: usize,

    /// Current decay exponent.
    decay: f64,

    /// Pre-computed FFT of the zero-padded power-law taps.
    kernel: Vec<Complex64>,

    /// Time-domain staging buffer.
    time_buf: Vec<Complex64>,

    /// Frequency-domain product buffer.
    freq_buf: Vec<Complex64>,

    /// Scratch required by the out-of-place transform API.
    scratch: Vec<Complex64>,

    /// Convolution tail carried into the next block's output.
    overflow: Vec<f64>,

    /// Cached FFT plans.
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
}

impl StreamConvolver {
    /// Create a filter for `block_len`-sample blocks with decay exponent
    /// `decay`.
    ///
    /// # Arguments
    ///
    /// * `block_len` - Samples per block, at least 1. Any length works;
    ///   powers of two transform fastest.
    /// * `decay` - Power-law exponent `s` in `h[t] = (1 + t)^(-s)`. Not
    ///   range-checked; see [`power_law_taps`].
    pub fn new(block_len: usize, decay: f64) -> FilterResult<Self> {
        if block_len == 0 {
            return Err(FilterError::InvalidBlockLen(block_len));
        }
        let fft_size = block_len * 2;

        let mut engine = FftEngine::new();
        let fft_forward = engine.get_fft_forward(fft_size);
        let fft_inverse = engine.get_fft_inverse(fft_size);
        let scratch_len = fft_forward
            .get_outofplace_scratch_len()
            .max(fft_inverse.get_outofplace_scratch_len());

        tracing::debug!(
            "StreamConvolver: block_len={}, fft_size={}, decay={}",
            block_len,
            fft_size,
            decay
        );

        let mut convolver = Self {
            block_len,
            fft_size,
            decay,
            kernel: vec![Complex64::new(0.0, 0.0); fft_size],
            time_buf: vec![Complex64::new(0.0, 0.0); fft_size],
            freq_buf: vec![Complex64::new(0.0, 0.0); fft_size],
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            overflow: vec![0.0; block_len],
            fft_forward,
            fft_inverse,
        };
        convolver.compute_kernel();
        Ok(convolver)
    }

    /// Rebuild the frequency-domain kernel from the current exponent.
    fn compute_kernel(&mut self) {
        let taps = power_law_taps(self.block_len, self.decay);
        for (slot, &tap) in self.time_buf.iter_mut().zip(taps.iter()) {
            *slot = Complex64::new(tap, 0.0);
        }
        for slot in self.time_buf[self.block_len..].iter_mut() {
            *slot = Complex64::new(0.0, 0.0);
        }
        self.fft_forward.process_outofplace_with_scratch(
            &mut self.time_buf,
            &mut self.kernel,
            &mut self.scratch,
        );
    }

    /// Filter one block, writing exactly one block of output.
    ///
    /// Both slices must be exactly [`block_len`](Self::block_len) samples;
    /// anything else is rejected before any state is touched, so a failed
    /// call leaves the stream exactly where it was.
    pub fn process(&mut self, input: &[f64], output: &mut [f64]) -> FilterResult<()> {
        if input.len() != self.block_len {
            return Err(FilterError::LengthMismatch {
                expected: self.block_len,
                actual: input.len(),
            });
        }
        if output.len() != self.block_len {
            return Err(FilterError::LengthMismatch {
                expected: self.block_len,
                actual: output.len(),
            });
        }

        // Stage the block, zero-padded to the transform size.
        for (slot, &sample) in self.time_buf.iter_mut().zip(input.iter()) {
            *slot = Complex64::new(sample, 0.0);
        }
        for slot in self.time_buf[self.block_len..].iter_mut() {
            *slot = Complex64::new(0.0, 0.0);
        }

        self.fft_forward.process_outofplace_with_scratch(
            &mut self.time_buf,
            &mut self.freq_buf,
            &mut self.scratch,
        );

        // Frequency-domain convolution. The kernel bins carry phase from
        // the zero-padding, so this is a full complex multiply.
        for (bin, weight) in self.freq_buf.iter_mut().zip(self.kernel.iter()) {
            *bin = *bin * *weight;
        }

        self.fft_inverse.process_outofplace_with_scratch(
            &mut self.freq_buf,
            &mut self.time_buf,
            &mut self.scratch,
        );

        // rustfft's inverse is unnormalized; fold 1/fft_size in here.
        // First half: this block's output plus the tail from the last
        // call. Second half: the new tail, overwriting the consumed one.
        let scale = 1.0 / self.fft_size as f64;
        for i in 0..self.block_len {
            output[i] = self.time_buf[i].re * scale + self.overflow[i];
        }
        for i in 0..self.block_len {
            self.overflow[i] = self.time_buf[self.block_len + i].re * scale;
        }

        Ok(())
    }

    /// Change the decay exponent.
    ///
    /// Setting the current value again is a no-op. The carried tail is not
    /// cleared: output already in flight from earlier blocks still reaches
    /// the next call's output unchanged.
    pub fn set_decay(&mut self, decay: f64) {
        if decay != self.decay {
            tracing::debug!("StreamConvolver: decay {} -> {}", self.decay, decay);
            self.decay = decay;
            self.compute_kernel();
        }
    }

    /// Clear the carried tail, as if no blocks had been processed.
    ///
    /// The kernel and decay exponent are untouched.
    pub fn reset(&mut self) {
        self.overflow.fill(0.0);
    }

    /// Samples consumed and produced per call.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Transform size used internally (twice the block length).
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Current decay exponent.
    #[inline]
    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// The tail that will be added into the next block's output.
    #[inline]
    pub fn overflow(&self) -> &[f64] {
        &self.overflow
    }
}

/// Direct convolution (for comparison/validation).
///
/// This is O(n*m) and should only be used for short signals.
pub fn direct_convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }

    let mut output = vec![0.0; signal.len() + kernel.len() - 1];
    for (i, &s) in signal.iter().enumerate() {
        for (j, &k) in kernel.iter().enumerate() {
            output[i + j] += s * k;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic test signal, loosely band-limited.
    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.13).cos())
            .collect()
    }

    /// Stream `blocks` blocks through a fresh filter, returning the
    /// concatenated output.
    fn stream_blocks(block_len: usize, decay: f64, input: &[f64]) -> Vec<f64> {
        assert_eq!(input.len() % block_len, 0);
        let mut filter = StreamConvolver::new(block_len, decay).unwrap();
        let mut output = vec![0.0; input.len()];
        for (inp, out) in input
            .chunks_exact(block_len)
            .zip(output.chunks_exact_mut(block_len))
        {
            filter.process(inp, out).unwrap();
        }
        output
    }

    #[test]
    fn test_matches_direct_convolution() {
        let block_len = 8;
        let decay = 0.7;
        let input = test_signal(block_len * 5);

        let streamed = stream_blocks(block_len, decay, &input);

        let taps = power_law_taps(block_len, decay);
        let direct = direct_convolve(&input, &taps);

        for (i, (s, d)) in streamed.iter().zip(direct.iter()).enumerate() {
            assert!((s - d).abs() < 1e-9, "sample {}: {} vs {}", i, s, d);
        }
    }

    #[test]
    fn test_matches_direct_convolution_non_pow2() {
        // Block lengths are not restricted to powers of two.
        let block_len = 6;
        let decay = 1.3;
        let input = test_signal(block_len * 4);

        let streamed = stream_blocks(block_len, decay, &input);

        let taps = power_law_taps(block_len, decay);
        let direct = direct_convolve(&input, &taps);

        for (i, (s, d)) in streamed.iter().zip(direct.iter()).enumerate() {
            assert!((s - d).abs() < 1e-9, "sample {}: {} vs {}", i, s, d);
        }
    }

    #[test]
    fn test_worked_impulse_scenario() {
        // N = 4, s = 1: the impulse response is the taps themselves,
        // spread over the first block, then silence.
        let mut filter = StreamConvolver::new(4, 1.0).unwrap();
        let mut out = [0.0; 4];

        filter.process(&[1.0, 0.0, 0.0, 0.0], &mut out).unwrap();
        let expected = [1.0, 0.5, 1.0 / 3.0, 0.25];
        for (o, e) in out.iter().zip(expected.iter()) {
            assert!((o - e).abs() < 1e-10, "{} vs {}", o, e);
        }

        for _ in 0..2 {
            filter.process(&[0.0; 4], &mut out).unwrap();
            for o in &out {
                assert!(o.abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_tail_carries_across_blocks() {
        // An impulse on the last sample of a block pushes most of the
        // response into the following block.
        let mut filter = StreamConvolver::new(4, 1.0).unwrap();
        let mut out = [0.0; 4];

        filter.process(&[0.0, 0.0, 0.0, 1.0], &mut out).unwrap();
        let first = [0.0, 0.0, 0.0, 1.0];
        for (o, e) in out.iter().zip(first.iter()) {
            assert!((o - e).abs() < 1e-10);
        }

        // The pending tail is observable before the next call.
        let tail = [0.5, 1.0 / 3.0, 0.25, 0.0];
        for (o, e) in filter.overflow().iter().zip(tail.iter()) {
            assert!((o - e).abs() < 1e-10);
        }

        filter.process(&[0.0; 4], &mut out).unwrap();
        for (o, e) in out.iter().zip(tail.iter()) {
            assert!((o - e).abs() < 1e-10);
        }
    }

    #[test]
    fn test_zero_exponent_is_running_sum() {
        // s = 0 weights all history equally: an impulse yields a block of
        // ones and nothing after the kernel ends.
        let mut filter = StreamConvolver::new(4, 0.0).unwrap();
        let mut out = [0.0; 4];

        filter.process(&[1.0, 0.0, 0.0, 0.0], &mut out).unwrap();
        for o in &out {
            assert!((o - 1.0).abs() < 1e-10);
        }

        filter.process(&[0.0; 4], &mut out).unwrap();
        for o in &out {
            assert!(o.abs() < 1e-10);
        }
    }

    #[test]
    fn test_causality() {
        // Two inputs agreeing up to index k produce outputs agreeing up
        // to index k, regardless of what follows.
        let block_len = 8;
        let a_in = test_signal(block_len);
        let mut b_in = a_in.clone();
        for i in 5..block_len {
            b_in[i] += 1.0;
        }

        let mut fa = StreamConvolver::new(block_len, 0.9).unwrap();
        let mut fb = StreamConvolver::new(block_len, 0.9).unwrap();
        let mut a_out = vec![0.0; block_len];
        let mut b_out = vec![0.0; block_len];
        fa.process(&a_in, &mut a_out).unwrap();
        fb.process(&b_in, &mut b_out).unwrap();

        for i in 0..5 {
            assert!((a_out[i] - b_out[i]).abs() < 1e-10, "diverged at {}", i);
        }
        assert!((a_out[5] - b_out[5]).abs() > 1e-3);
    }

    #[test]
    fn test_set_decay_same_value_is_noop() {
        let mut filter = StreamConvolver::new(8, 0.75).unwrap();
        let mut out = [0.0; 8];
        filter.process(&test_signal(8), &mut out).unwrap();

        let kernel_before = filter.kernel.clone();
        let overflow_before = filter.overflow.clone();

        filter.set_decay(0.75);

        assert!(filter
            .kernel
            .iter()
            .zip(kernel_before.iter())
            .all(|(a, b)| a == b));
        assert!(filter
            .overflow
            .iter()
            .zip(overflow_before.iter())
            .all(|(a, b)| a == b));

        filter.set_decay(0.5);
        assert!(filter
            .kernel
            .iter()
            .zip(kernel_before.iter())
            .any(|(a, b)| a != b));
        assert_eq!(filter.decay(), 0.5);
    }

    #[test]
    fn test_set_decay_preserves_pending_tail() {
        let mut filter = StreamConvolver::new(4, 1.0).unwrap();
        let mut out = [0.0; 4];
        filter.process(&[0.0, 0.0, 0.0, 1.0], &mut out).unwrap();

        let tail_before = filter.overflow().to_vec();
        filter.set_decay(2.0);
        assert_eq!(filter.overflow(), tail_before.as_slice());

        // A zero block emits exactly the pending tail.
        filter.process(&[0.0; 4], &mut out).unwrap();
        for (o, t) in out.iter().zip(tail_before.iter()) {
            assert!((o - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_contexts_are_isolated() {
        let block = test_signal(4);
        let mut a = StreamConvolver::new(4, 1.0).unwrap();
        let mut b = StreamConvolver::new(4, 1.0).unwrap();
        let mut a_out = [0.0; 4];
        let mut b_out = [0.0; 4];

        a.process(&block, &mut a_out).unwrap();
        b.process(&block, &mut b_out).unwrap();
        assert_eq!(a_out, b_out);

        // Retuning b must not leak into a.
        b.set_decay(0.25);
        a.process(&block, &mut a_out).unwrap();
        b.process(&block, &mut b_out).unwrap();
        assert_ne!(a_out, b_out);

        let mut reference = StreamConvolver::new(4, 1.0).unwrap();
        let mut ref_out = [0.0; 4];
        reference.process(&block, &mut ref_out).unwrap();
        reference.process(&block, &mut ref_out).unwrap();
        assert_eq!(a_out, ref_out);
    }

    #[test]
    fn test_block_len_one() {
        // A single-tap kernel is always (1 + 0)^(-s) = 1, so the filter
        // degenerates to identity at any exponent.
        let mut filter = StreamConvolver::new(1, 3.7).unwrap();
        let mut out = [0.0; 1];
        for &x in &[2.5, -1.0, 3.0, 0.0] {
            filter.process(&[x], &mut out).unwrap();
            assert!((out[0] - x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_block_len_rejected() {
        let result = StreamConvolver::new(0, 1.0);
        assert!(matches!(result, Err(FilterError::InvalidBlockLen(0))));
    }

    #[test]
    fn test_length_mismatch_rejected_without_mutation() {
        let block = test_signal(4);
        let mut filter = StreamConvolver::new(4, 1.0).unwrap();
        let mut out = [0.0; 4];
        filter.process(&block, &mut out).unwrap();

        let overflow_before = filter.overflow().to_vec();

        let short_in = [1.0; 3];
        let err = filter.process(&short_in, &mut out).unwrap_err();
        assert!(matches!(
            err,
            FilterError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));

        let mut long_out = [0.0; 5];
        let err = filter.process(&block, &mut long_out).unwrap_err();
        assert!(matches!(
            err,
            FilterError::LengthMismatch {
                expected: 4,
                actual: 5
            }
        ));

        // The failed calls must be invisible to the stream.
        assert_eq!(filter.overflow(), overflow_before.as_slice());
        filter.process(&block, &mut out).unwrap();

        let mut reference = StreamConvolver::new(4, 1.0).unwrap();
        let mut ref_out = [0.0; 4];
        reference.process(&block, &mut ref_out).unwrap();
        reference.process(&block, &mut ref_out).unwrap();
        assert_eq!(out, ref_out);
    }

    #[test]
    fn test_non_finite_decay_propagates() {
        // Degenerate exponents are not validated; the poison shows up in
        // the output instead of a panic.
        let mut filter = StreamConvolver::new(4, -2000.0).unwrap();
        let mut out = [0.0; 4];
        filter.process(&[1.0; 4], &mut out).unwrap();
        assert!(out.iter().any(|o| !o.is_finite()));
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut filter = StreamConvolver::new(4, 1.0).unwrap();
        let mut out = [0.0; 4];
        filter.process(&[0.0, 0.0, 0.0, 1.0], &mut out).unwrap();
        assert!(filter.overflow().iter().any(|&t| t != 0.0));

        filter.reset();
        assert!(filter.overflow().iter().all(|&t| t == 0.0));
        assert_eq!(filter.decay(), 1.0);

        filter.process(&[0.0; 4], &mut out).unwrap();
        for o in &out {
            assert!(o.abs() < 1e-12);
        }
    }

    #[test]
    fn test_accessors() {
        let filter = StreamConvolver::new(6, 1.5).unwrap();
        assert_eq!(filter.block_len(), 6);
        assert_eq!(filter.fft_size(), 12);
        assert_eq!(filter.decay(), 1.5);
        assert_eq!(filter.overflow().len(), 6);
        assert!(filter.overflow().iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_direct_convolve_impulse() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let kernel = vec![1.0];
        assert_eq!(direct_convolve(&signal, &kernel), signal);
    }

    #[test]
    fn test_direct_convolve_empty() {
        assert!(direct_convolve(&[], &[1.0]).is_empty());
        assert!(direct_convolve(&[1.0], &[]).is_empty());
    }
}
