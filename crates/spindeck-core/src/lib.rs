//! Spindeck Core - control and audio engine of a two-deck DJ controller
//!
//! Streams ADPCM-compressed tracks from block storage, resamples each
//! deck at a jog-wheel-controlled rate (including scratch-style reverse),
//! filters and crossfades the decks onto main and monitor buses, and
//! closes the loop on two motorized platters via PID control.
//!
//! The core is four cooperating tasks around a handful of bounded queues:
//!
//! ```text
//! encoders/buttons/pots ──► I/O task ──► (input queue) ──► audio task ──► AudioSink
//!                            │                              ▲
//!                            └──► motor PID ─► MotorSink    │ sector rings
//!                                                           │ (one per deck)
//!        BlockStorage ◄──── stream task ◄── (command queue)─┘
//! ```
//!
//! See [`rt::Core`] for wiring it all up, and [`hal`] for the traits a
//! host must provide.

pub mod audio_out;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod gc;
pub mod hal;
pub mod io;
pub mod ring;
pub mod rt;
pub mod sampler;
pub mod stream;
pub mod track;
pub mod types;
pub mod ui;

pub use config::CoreConfig;
pub use rt::{Core, CoreHandles, StartupError};
pub use types::*;
