//! Nearest-neighbor downsampling effect
//!
//! Simulates resampling to a lower rate and back by holding the current
//! sample until a DDA accumulator overflows. The error-diffusion step
//! keeps the effective rate accurate even for ratios that do not divide
//! the buffer size.

use crate::types::Sample;

const STEP_UNIT: u32 = 1 << 16;

/// Sample-and-hold bitcrusher
#[derive(Debug, Clone)]
pub struct Bitcrusher {
    step: u32,

    accumulator: u32,
    last_sample: Sample,
}

impl Bitcrusher {
    pub fn new() -> Self {
        let mut crusher = Self {
            step: 0,
            accumulator: 0,
            last_sample: 0,
        };
        crusher.configure(1.0);
        crusher
    }

    /// Set the downsampling ratio (output rate / input rate)
    ///
    /// Clamped to (0.001, 1]; 1.0 refreshes the held sample every frame
    /// and is thus transparent.
    pub fn configure(&mut self, ratio: f32) {
        let ratio = ratio.clamp(0.001, 1.0);

        self.step = (STEP_UNIT as f32 / ratio + 0.5) as u32;
    }

    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.last_sample = 0;
    }

    /// Crush `frames` samples in place, `stride` apart
    pub fn process(&mut self, buffer: &mut [Sample], frames: usize, stride: usize) {
        let step = self.step;

        let mut accumulator = self.accumulator;
        let mut last_sample = self.last_sample;

        let mut index = 0;

        for _ in 0..frames {
            accumulator += STEP_UNIT;

            if accumulator >= step {
                accumulator -= step;
                last_sample = buffer[index];
            }

            buffer[index] = last_sample;
            index += stride;
        }

        self.accumulator = accumulator;
        self.last_sample = last_sample;
    }
}

impl Default for Bitcrusher {
    fn default() -> Self {
        Self::new()
    }
}
