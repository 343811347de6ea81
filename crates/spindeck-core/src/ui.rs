//! Lock-free deck observation for display
//!
//! Screens and telemetry read deck state here without ever touching a
//! lock: playback state comes from the audio task's atomics (a torn read
//! across fields is fine, the values only drive pixels) and track details
//! come from a `SharedCell` the stream task republishes on open, close
//! and variant changes.
//!
//! Nothing obtained through this module may be used for control
//! decisions; the authoritative state lives in the audio task.

use std::sync::Arc;

use basedrop::{Handle, Shared, SharedCell};

use crate::engine::{DeckAtomics, DeckState};

/// Immutable details of the track loaded on a deck
#[derive(Debug, Clone)]
pub struct TrackDetails {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub track_number: u8,
    pub track_count: u8,
    pub disc_number: u8,
    pub disc_count: u8,

    pub sample_rate: u32,
    pub num_chunks: u32,
    pub num_variants: u8,
    /// Active variant index
    pub variant: u8,
    /// Active variant's pitch offset in 1/16 semitone
    pub pitch_offset: i16,
    /// Display label for the musical key of the active variant
    pub key_name: String,
    /// Track length in seconds
    pub duration: f32,
    /// 4-bit waveform summary, two nibbles per byte, low first
    pub waveform: Vec<u8>,
}

/// Publication slot for a deck's [`TrackDetails`] (`None` = no track)
pub type DetailsCell = SharedCell<Option<TrackDetails>>;

/// Create an empty details slot
///
/// `gc` is the reclaimer handle the slot's values are allocated through
/// (see [`crate::gc::Reclaimer`]).
pub fn details_cell(gc: &Handle) -> Arc<DetailsCell> {
    Arc::new(SharedCell::new(Shared::new(gc, None)))
}

/// Read-only view of one deck for UI consumers
#[derive(Clone)]
pub struct DeckView {
    atomics: Arc<DeckAtomics>,
    details: Arc<DetailsCell>,
}

impl DeckView {
    pub fn new(atomics: Arc<DeckAtomics>, details: Arc<DetailsCell>) -> Self {
        Self { atomics, details }
    }

    /// Best-effort copy of the deck's playback state
    pub fn state(&self) -> DeckState {
        self.atomics.load()
    }

    /// Handle to the current track details, if a track is loaded
    pub fn details(&self) -> Shared<Option<TrackDetails>> {
        self.details.get()
    }

    /// Playback position in seconds
    pub fn current_time(&self) -> f32 {
        self.state().current_time()
    }
}
