//! Audio output backends
//!
//! The engine only knows the blocking [`crate::hal::AudioSink`] trait; on
//! the reference hardware that is a pair of I²S channels. The desktop
//! build ships a cpal implementation behind the `cpal-backend` feature:
//! the host keeps the (thread-bound) output streams alive and hands the
//! `Send` sink half to the core.

#[cfg(feature = "cpal-backend")]
pub mod cpal_backend;

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{CpalOutput, CpalSink};

use thiserror::Error;

/// Errors from audio output backends
#[derive(Error, Debug)]
pub enum AudioOutError {
    #[error("no audio output devices found")]
    NoDevices,

    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to get device config: {0}")]
    ConfigError(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlayError(String),
}
