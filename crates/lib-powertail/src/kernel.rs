//! Power-law impulse response generation.
//!
//! The filter's memory is a causal kernel whose weight on a sample `t`
//! steps in the past is `(1 + t)^(-s)`. Larger exponents forget faster;
//! `s = 0` weights all history equally.

use crate::error::FilterResult;
use crate::fft;

/// Generate `len` causal power-law taps: `h[t] = (1 + t)^(-s)`.
///
/// The `1 + t` offset keeps the `t = 0` tap finite for every exponent.
/// No range check is applied to `s`; extreme values produce infinities
/// or NaN taps and those propagate to the filter output unchanged.
pub fn power_law_taps(len: usize, decay: f64) -> Vec<f64> {
    (0..len).map(|t| (1.0 + t as f64).powf(-decay)).collect()
}

/// Magnitude response of a tap set, zero-padded to `fft_len`.
///
/// Returns `fft_len / 2 + 1` linear magnitudes from DC to Nyquist.
/// `fft_len` shorter than the tap set is rounded up so no tap is lost.
pub fn magnitude_response(taps: &[f64], fft_len: usize) -> FilterResult<Vec<f64>> {
    let mut padded = taps.to_vec();
    padded.resize(fft_len.max(taps.len()), 0.0);
    fft::magnitude_spectrum(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taps_unit_exponent() {
        let taps = power_law_taps(4, 1.0);
        let expected = [1.0, 0.5, 1.0 / 3.0, 0.25];
        for (t, e) in taps.iter().zip(expected.iter()) {
            assert!((t - e).abs() < 1e-12, "tap {} vs {}", t, e);
        }
    }

    #[test]
    fn test_taps_zero_exponent_is_all_pass() {
        // (1 + t)^0 == 1 exactly, for every t.
        let taps = power_law_taps(16, 0.0);
        assert!(taps.iter().all(|&t| t == 1.0));
    }

    #[test]
    fn test_taps_negative_exponent_grows() {
        let taps = power_law_taps(8, -0.5);
        for pair in taps.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_taps_first_is_always_one() {
        for &s in &[0.0, 0.1, 1.0, 5.0, -3.0] {
            assert_eq!(power_law_taps(1, s)[0], 1.0);
        }
    }

    #[test]
    fn test_taps_extreme_exponent_overflows() {
        let taps = power_law_taps(4, -2000.0);
        assert!(taps[1..].iter().any(|t| !t.is_finite()));
    }

    #[test]
    fn test_taps_empty() {
        assert!(power_law_taps(0, 1.0).is_empty());
    }

    #[test]
    fn test_magnitude_response_dc_is_tap_sum() {
        let taps = power_law_taps(8, 0.0);
        let mags = magnitude_response(&taps, 32).unwrap();
        assert_eq!(mags.len(), 17);
        assert!((mags[0] - 8.0).abs() < 1e-10);
    }
}
