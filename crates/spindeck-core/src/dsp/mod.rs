//! Scalar DSP primitives
//!
//! Everything in here is stride-aware so the same routine can process one
//! channel of an interleaved stereo buffer, and fixed-point where the
//! original hardware was: biquad, gain and mixer use 14-bit coefficients,
//! the codec-facing pieces use the conventions described in the track
//! format. Filter state always survives across buffers; `reset` zeroes it.

mod biquad;
mod bitcrusher;
mod gain;
mod pid;
mod smooth;
mod waveform;

pub use biquad::{BiquadFilter, BiquadMode};
pub use bitcrusher::Bitcrusher;
pub use gain::{Gain, Mixer};
pub use pid::Pid;
pub use smooth::SpeedSmoother;
pub use waveform::{waveform_nibble, WaveformEncoder, WAVEFORM_RANGE, WAVEFORM_SAMPLE_RATE};
