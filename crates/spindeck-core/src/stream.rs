//! Stream task: predictive sector prefetcher
//!
//! Work-driven rather than timer-driven: every iteration drains the
//! command queue, then tops up each deck's sector ring with the chunk the
//! audio engine is predicted to need next. When there is nothing to do it
//! parks on the command queue with a bounded timeout, so an incoming
//! command wakes it immediately and an idle loop costs nothing.
//!
//! The predictor walks forward from the current playback position,
//! folding the walk back into the loop region when looping is active, and
//! stops at the end of the track. Reverse playback is intentionally not
//! predicted: short scratch-style reversals are served by the sampler's
//! second cache slot, and the ring re-synchronizes through the consumer's
//! skip-until-match discipline as soon as playback resumes forward.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{flag, DeckAtomics, DeckEvent, DeckState};
use crate::hal::BlockStorage;
use crate::ring;
use crate::track::{TrackReader, CHUNK_INDEX_UNIT};
use crate::types::NUM_DECKS;
use crate::ui::{DetailsCell, TrackDetails};

/// Commands accepted by the stream task, FIFO per deck
#[derive(Debug, Clone)]
pub enum StreamCommand {
    /// Open a track file on a deck
    Open { deck: usize, path: PathBuf },
    /// Close the deck's track
    Close { deck: usize },
    /// Step to the previous pitch variant
    PrevVariant { deck: usize },
    /// Step to the next pitch variant
    NextVariant { deck: usize },
    /// Return to the default pitch variant
    ResetVariant { deck: usize },
}

/// Capacity of the command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Idle wait before re-checking for prefetch work
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Create the stream command channel
pub fn command_channel() -> (flume::Sender<StreamCommand>, flume::Receiver<StreamCommand>) {
    flume::bounded(COMMAND_QUEUE_CAPACITY)
}

/// Predict the next chunk a deck will need
///
/// `lookahead` is the number of sectors already buffered, so the
/// prediction always lands just past what has been queued. Returns `None`
/// when the walk runs off the end of the track.
pub fn predict_next_chunk(state: &DeckState, num_chunks: i32, lookahead: usize) -> Option<i32> {
    let mut chunk = state.playback_offset / CHUNK_INDEX_UNIT;

    if chunk >= num_chunks {
        return None;
    }

    let looping = state.flags & flag::LOOPING != 0 && state.has_valid_loop();

    for _ in 0..lookahead {
        chunk += 1;
        let mut offset = chunk * CHUNK_INDEX_UNIT;

        if looping {
            while offset >= state.loop_end {
                offset -= state.loop_end - state.loop_start;
            }
            chunk = offset / CHUNK_INDEX_UNIT;
        }

        if chunk >= num_chunks {
            return None;
        }
    }

    Some(chunk)
}

/// The file streaming task
pub struct StreamTask {
    storage: Box<dyn BlockStorage>,
    readers: [TrackReader; NUM_DECKS],

    commands: flume::Receiver<StreamCommand>,
    rings: [ring::Producer; NUM_DECKS],
    atomics: [Arc<DeckAtomics>; NUM_DECKS],
    events: rtrb::Producer<DeckEvent>,
    details: [Arc<DetailsCell>; NUM_DECKS],
    gc: basedrop::Handle,
}

impl StreamTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Box<dyn BlockStorage>,
        commands: flume::Receiver<StreamCommand>,
        rings: [ring::Producer; NUM_DECKS],
        atomics: [Arc<DeckAtomics>; NUM_DECKS],
        events: rtrb::Producer<DeckEvent>,
        details: [Arc<DetailsCell>; NUM_DECKS],
        gc: basedrop::Handle,
    ) -> Self {
        Self {
            storage,
            readers: [TrackReader::new(), TrackReader::new()],
            commands,
            rings,
            atomics,
            events,
            details,
            gc,
        }
    }

    /// Run until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("stream task running");

        while !shutdown.load(Ordering::Relaxed) {
            if !self.poll_once() {
                // Nothing to prefetch and no pending commands: park on
                // the queue so a command wakes us immediately.
                if let Ok(command) = self.commands.recv_timeout(IDLE_WAIT) {
                    self.handle_command(command);
                }
            }
        }
    }

    /// Drain commands and prefetch at most one sector per deck
    ///
    /// Returns whether any work was done. Public so tests can step the
    /// task deterministically.
    pub fn poll_once(&mut self) -> bool {
        let mut worked = false;

        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
            worked = true;
        }

        for deck in 0..NUM_DECKS {
            worked |= self.service_deck(deck);
        }

        worked
    }

    /// Reader for a deck, for metadata queries from the owning thread
    pub fn reader(&self, deck: usize) -> &TrackReader {
        &self.readers[deck]
    }

    fn service_deck(&mut self, deck: usize) -> bool {
        let Some(header) = self.readers[deck].header() else {
            return false;
        };
        let num_chunks = header.num_chunks as i32;

        // Predict from the audio task's published state, accounting for
        // what is already buffered.
        let state = self.atomics[deck].load();
        let lookahead = self.rings[deck].len();

        let Some(chunk) = predict_next_chunk(&state, num_chunks, lookahead) else {
            return false;
        };

        let Some(entry) = self.rings[deck].begin() else {
            return false; // ring full
        };

        entry.chunk = chunk;
        let read = self.readers[deck].read(&mut entry.sector, chunk as u32);

        match read {
            Ok(()) => {
                self.rings[deck].commit();
                true
            }
            Err(error) => {
                // Abandon the reservation; the next iteration retries and
                // persistent failure surfaces as sampler underrun silence.
                log::warn!("deck {deck}: sector {chunk} read failed: {error}");
                self.rings[deck].abandon();
                false
            }
        }
    }

    fn handle_command(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::Open { deck, path } => {
                match self.readers[deck].open(&mut *self.storage, &path) {
                    Ok(()) => {
                        let sample_rate = self.readers[deck]
                            .header()
                            .map(|h| h.sample_rate)
                            .unwrap_or(0);
                        self.publish_details(deck);
                        self.send_event(DeckEvent::Loaded { deck, sample_rate });
                    }
                    Err(error) => {
                        // The reader rolled back; make sure the rest of
                        // the system agrees the deck is empty.
                        log::error!("deck {deck}: could not open {}: {error}", path.display());
                        self.publish_details(deck);
                        self.send_event(DeckEvent::Unloaded { deck });
                    }
                }
            }
            StreamCommand::Close { deck } => {
                self.readers[deck].close();
                self.publish_details(deck);
                self.send_event(DeckEvent::Unloaded { deck });
            }
            StreamCommand::PrevVariant { deck } => {
                self.step_variant(deck, -1);
            }
            StreamCommand::NextVariant { deck } => {
                self.step_variant(deck, 1);
            }
            StreamCommand::ResetVariant { deck } => {
                if self.readers[deck].is_open() {
                    self.readers[deck].reset_variant();
                    self.publish_details(deck);
                    self.send_event(DeckEvent::VariantChanged { deck });
                }
            }
        }
    }

    fn step_variant(&mut self, deck: usize, direction: i32) {
        let reader = &mut self.readers[deck];
        if !reader.is_open() {
            return;
        }

        let before = reader.variant();
        reader.set_variant(before as i32 + direction);

        if reader.variant() != before {
            log::debug!("deck {deck}: variant {}", reader.variant());
            self.publish_details(deck);
            self.send_event(DeckEvent::VariantChanged { deck });
        }
    }

    fn publish_details(&mut self, deck: usize) {
        let details = self.readers[deck].header().map(|header| {
            let variant = self.readers[deck].variant();

            TrackDetails {
                title: header.title().to_string(),
                artist: header.artist().to_string(),
                album: header.album().to_string(),
                genre: header.genre().to_string(),
                track_number: header.track_number,
                track_count: header.track_count,
                disc_number: header.disc_number,
                disc_count: header.disc_count,
                sample_rate: header.sample_rate,
                num_chunks: header.num_chunks,
                num_variants: header.num_variants,
                variant,
                pitch_offset: header.pitch_offsets[variant as usize],
                key_name: header.key_name(variant),
                duration: header.duration(),
                waveform: self.readers[deck]
                    .waveform()
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            }
        });

        self.details[deck].set(basedrop::Shared::new(&self.gc, details));
    }

    fn send_event(&mut self, event: DeckEvent) {
        if self.events.push(event).is_err() {
            log::warn!("deck event queue full, dropping {event:?}");
        }
    }
}
