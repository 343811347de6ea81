//! Platter speed smoothing
//!
//! Raw jog wheel deltas are quantized to encoder steps and arrive at the
//! input poll rate, so the instantaneous speed estimate is noisy. A
//! single-pole low-pass stabilizes it before it drives the sampler step;
//! the coefficient is configurable (see `CoreConfig::speed_smoothing`) and
//! adds no buffering, so the jog response stays well within one audio
//! buffer of latency.

/// One-pole low-pass smoother for measured platter speed
#[derive(Debug, Clone)]
pub struct SpeedSmoother {
    coefficient: f32,
    state: f32,
}

impl SpeedSmoother {
    /// Create a smoother; `coefficient` is clamped to (0, 1]
    pub fn new(coefficient: f32) -> Self {
        Self {
            coefficient: coefficient.clamp(f32::EPSILON, 1.0),
            state: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    /// Feed one raw speed measurement, returning the smoothed value
    pub fn update(&mut self, value: f32) -> f32 {
        self.state += self.coefficient * (value - self.state);
        self.state
    }
}
