//! # lib-powertail
//!
//! Streaming convolution against a power-law memory kernel.
//!
//! A [`StreamConvolver`] filters a real-valued signal in fixed-size blocks
//! with the causal impulse response `h[t] = (1 + t)^(-s)`, carrying the
//! convolution tail between calls so the block stream is bit-continuous:
//!
//! - **Kernel**: power-law taps, transformed once and cached per exponent
//! - **Engine**: FFT overlap-add, one forward/multiply/inverse per block
//! - **Retuning**: the exponent is adjustable mid-stream without dropping
//!   in-flight output
//!
//! ```
//! use lib_powertail::StreamConvolver;
//!
//! let mut filter = StreamConvolver::new(4, 1.0)?;
//! let mut out = [0.0; 4];
//! filter.process(&[1.0, 0.0, 0.0, 0.0], &mut out)?;
//! assert!((out[1] - 0.5).abs() < 1e-10);
//! # Ok::<(), lib_powertail::FilterError>(())
//! ```

pub mod error;
pub mod fft;
pub mod kernel;
pub mod stream;

pub use error::{FilterError, FilterResult};
pub use fft::FftEngine;
pub use kernel::power_law_taps;
pub use stream::{direct_convolve, StreamConvolver};
