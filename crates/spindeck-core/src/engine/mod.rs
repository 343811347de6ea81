//! Audio engine: decks, the audio task and its shared state
//!
//! The audio task is the critical path of the whole device. Per buffer it
//! drains pending input snapshots, runs each deck's sampler and filter,
//! mixes the two decks onto the main (crossfaded) and monitor (cueing)
//! buses, applies the bitcrusher and blocks in the audio sink. Everything
//! it touches on the way is wait-free.
//!
//! ```text
//!  input queue ──► AudioTask ──► AudioSink
//!                  │  ▲
//!     deck events ─┘  └─ sector rings (one per deck, filled by the
//!                        stream task)
//! ```

mod atomics;
mod audio;
mod deck;

pub use atomics::DeckAtomics;
pub use audio::{event_channel, input_channel, AudioTask};
pub use deck::{flag, Deck, DeckState, UNSET_OFFSET};

/// Client interface the audio task uses to reach the stream task
///
/// The audio and stream tasks reference each other (variant requests flow
/// one way, sectors the other); this trait breaks the cycle so the engine
/// can be wired after both sides exist.
pub trait CommandSink: Send {
    /// Request the previous pitch variant for a deck
    fn prev_variant(&mut self, deck: usize);

    /// Request the next pitch variant for a deck
    fn next_variant(&mut self, deck: usize);
}

/// Deck lifecycle notifications from the stream task to the audio task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckEvent {
    /// A track was opened on `deck`
    Loaded { deck: usize, sample_rate: u32 },
    /// The track on `deck` was closed
    Unloaded { deck: usize },
    /// The active variant of `deck` changed
    VariantChanged { deck: usize },
}
