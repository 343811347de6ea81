//! Tunable engine settings
//!
//! The core never touches the filesystem; hosts deserialize a [`CoreConfig`]
//! from wherever they keep settings and pass it to [`crate::rt::Core`].
//! Every field has a default matching the reference hardware tuning.

use serde::{Deserialize, Serialize};

/// PID gains for the platter motor controllers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Clamp applied to the integral accumulator (symmetric, ±iclamp)
    pub iclamp: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.08,
            kd: 0.0005,
            iclamp: 1.0,
        }
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Motor PID gains (shared by both decks)
    pub motor_pid: PidConfig,
    /// Input poll / motor update period in milliseconds
    pub io_period_ms: u64,
    /// Sector ring depth per deck, in sectors
    pub ring_sectors: usize,
    /// Half-width of the platter speed range around nominal
    /// (0.16 = the speed pot sweeps ±16%)
    pub speed_range: f32,
    /// Coefficient of the one-pole low-pass applied to measured platter
    /// speed before it drives the sampler step (0 < c <= 1; 1 = no
    /// smoothing)
    pub speed_smoothing: f32,
    /// Nominal platter speed in revolutions per minute
    pub nominal_rpm: f32,
    /// Jog wheel resolution in encoder steps per revolution
    pub steps_per_rev: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            motor_pid: PidConfig::default(),
            io_period_ms: 10,
            ring_sectors: 48,
            speed_range: 0.16,
            speed_smoothing: 0.3,
            nominal_rpm: 45.0,
            steps_per_rev: 1 << 12,
        }
    }
}

impl CoreConfig {
    /// Nominal platter speed in revolutions per second
    pub fn nominal_rps(&self) -> f32 {
        self.nominal_rpm / 60.0
    }
}
