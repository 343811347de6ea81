//! Lock-free deck state mirror
//!
//! The audio task owns the authoritative [`DeckState`](super::DeckState)
//! and republishes it here after every buffer. Readers (UI, the I/O
//! task's motor logic, the stream task's predictor) load individual
//! fields with relaxed ordering; a read torn across fields is acceptable
//! because nothing on the read side makes sample-accurate decisions.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

use super::{DeckState, UNSET_OFFSET};

/// Relaxed-atomic mirror of one deck's state
#[derive(Debug)]
pub struct DeckAtomics {
    pub playback_offset: AtomicI32,
    pub playback_step: AtomicI32,
    pub cue_offset: AtomicI32,
    pub loop_start: AtomicI32,
    pub loop_end: AtomicI32,
    pub sample_rate: AtomicU32,
    pub flags: AtomicU8,
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            playback_offset: AtomicI32::new(0),
            playback_step: AtomicI32::new(0),
            cue_offset: AtomicI32::new(0),
            loop_start: AtomicI32::new(UNSET_OFFSET),
            loop_end: AtomicI32::new(UNSET_OFFSET),
            sample_rate: AtomicU32::new(0),
            flags: AtomicU8::new(0),
        }
    }

    /// Publish a deck state (called from the audio task)
    pub fn store(&self, state: &DeckState) {
        self.playback_offset
            .store(state.playback_offset, Ordering::Relaxed);
        self.playback_step
            .store(state.playback_step, Ordering::Relaxed);
        self.cue_offset.store(state.cue_offset, Ordering::Relaxed);
        self.loop_start.store(state.loop_start, Ordering::Relaxed);
        self.loop_end.store(state.loop_end, Ordering::Relaxed);
        self.sample_rate.store(state.sample_rate, Ordering::Relaxed);
        self.flags.store(state.flags, Ordering::Relaxed);
    }

    /// Best-effort snapshot; fields may be torn across buffers
    pub fn load(&self) -> DeckState {
        DeckState {
            playback_offset: self.playback_offset.load(Ordering::Relaxed),
            playback_step: self.playback_step.load(Ordering::Relaxed),
            cue_offset: self.cue_offset.load(Ordering::Relaxed),
            loop_start: self.loop_start.load(Ordering::Relaxed),
            loop_end: self.loop_end.load(Ordering::Relaxed),
            sample_rate: self.sample_rate.load(Ordering::Relaxed),
            flags: self.flags.load(Ordering::Relaxed),
        }
    }

    /// Read the flag byte only (cheaper than a full snapshot)
    pub fn flags(&self) -> u8 {
        self.flags.load(Ordering::Relaxed)
    }
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}
