//! Deck - one independent playback engine
//!
//! A deck owns its sampler, filter, speed smoothing and the consumer half
//! of its sector ring. The audio task drives [`Deck::process`] once per
//! buffer and routes input snapshots to the update/button methods.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::dsp::{BiquadFilter, BiquadMode, SpeedSmoother};
use crate::hal::{button, DeckButtons};
use crate::ring;
use crate::sampler::{Sampler, SectorSource};
use crate::track::{Sector, SAMPLE_OFFSET_UNIT};
use crate::types::{
    AudioBuffer, AUDIO_BUFFER_SIZE, NUM_CHANNELS, OUTPUT_SAMPLE_RATE, SILENT_BUFFER,
};

use super::{CommandSink, DeckAtomics};

/// Sentinel for unset cue/loop offsets
pub const UNSET_OFFSET: i32 = i32::MIN;

/// Deck state flag bits
pub mod flag {
    pub const PLAYING: u8 = 1 << 0;
    pub const MONITORING: u8 = 1 << 1;
    pub const LOOPING: u8 = 1 << 2;
    pub const REVERSE: u8 = 1 << 3;
    /// Another button was pressed while shift (monitor) was held, so the
    /// monitor toggle is suppressed on release
    pub const SHIFT_USED: u8 = 1 << 4;
}

/// Authoritative per-deck playback state
///
/// All offsets are in 1/16-sample units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckState {
    pub playback_offset: i32,
    pub playback_step: i32,
    pub cue_offset: i32,
    pub loop_start: i32,
    pub loop_end: i32,
    pub sample_rate: u32,
    pub flags: u8,
}

impl DeckState {
    pub fn new() -> Self {
        Self {
            playback_offset: 0,
            playback_step: 0,
            cue_offset: 0,
            loop_start: UNSET_OFFSET,
            loop_end: UNSET_OFFSET,
            sample_rate: 0,
            flags: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// A loop is usable iff both points are set and properly ordered
    pub fn has_valid_loop(&self) -> bool {
        self.loop_start >= 0 && self.loop_end > self.loop_start
    }

    /// Playback position in seconds
    pub fn current_time(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }

        self.playback_offset as f32 / (self.sample_rate as f32 * SAMPLE_OFFSET_UNIT as f32)
    }
}

impl Default for DeckState {
    fn default() -> Self {
        Self::new()
    }
}

/// Skip-until-match adapter between the sector ring and the sampler
///
/// The prefetcher is allowed to be wrong (after a seek or a variant
/// change); stale entries are discarded on the spot until the requested
/// chunk surfaces. An empty ring is an underrun and the sampler
/// substitutes silence.
struct RingSource {
    consumer: ring::Consumer,
    discarded: u64,
    underruns: u64,
}

impl SectorSource for RingSource {
    fn fetch(&mut self, chunk: i32) -> Option<&Sector> {
        loop {
            match self.consumer.peek_chunk() {
                None => {
                    self.underruns += 1;
                    return None;
                }
                Some(c) if c == chunk => break,
                Some(_) => {
                    self.consumer.advance();
                    self.discarded += 1;
                }
            }
        }

        self.consumer.peek().map(|entry| &entry.sector)
    }

    fn release(&mut self) {
        self.consumer.advance();
    }
}

/// One playback deck
pub struct Deck {
    index: usize,
    pub state: DeckState,

    sampler: Sampler,
    filter: BiquadFilter,
    smoother: SpeedSmoother,
    source: RingSource,
    buffer: AudioBuffer,
    atomics: Arc<DeckAtomics>,

    /// Encoder steps to nominal-speed revolutions conversion
    speed_scale: f32,
}

impl Deck {
    pub fn new(
        index: usize,
        consumer: ring::Consumer,
        atomics: Arc<DeckAtomics>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            index,
            state: DeckState::new(),
            sampler: Sampler::new(),
            filter: BiquadFilter::new(),
            smoother: SpeedSmoother::new(config.speed_smoothing),
            source: RingSource {
                consumer,
                discarded: 0,
                underruns: 0,
            },
            buffer: SILENT_BUFFER,
            atomics,
            speed_scale: 1.0 / (config.steps_per_rev as f32 * config.nominal_rps()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The deck's output for the last processed buffer
    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// (discarded stale entries, underruns) seen on the sector ring
    pub fn stream_stats(&self) -> (u64, u64) {
        (self.source.discarded, self.source.underruns)
    }

    /// Chunks currently held in the decoded-sector cache
    pub fn cached_chunks(&self) -> [i32; 2] {
        self.sampler.cached_chunks()
    }

    /// Reset playback for a newly loaded track
    pub fn track_loaded(&mut self, sample_rate: u32) {
        self.state.reset();
        self.state.sample_rate = sample_rate;
        self.sampler.flush();
        self.filter.reset();
        self.smoother.reset();
        self.publish();
    }

    /// Drop playback state when the track goes away
    pub fn track_unloaded(&mut self) {
        self.state.reset();
        self.sampler.flush();
        self.publish();
    }

    /// Invalidate decoded sectors after a variant switch
    pub fn variant_changed(&mut self) {
        self.sampler.flush();
    }

    /// Produce one buffer of filtered deck output and advance playback
    pub fn process(&mut self) {
        self.sampler.process(
            &mut self.buffer,
            &mut self.source,
            self.state.playback_offset,
            self.state.playback_step,
            AUDIO_BUFFER_SIZE,
        );

        for channel in 0..NUM_CHANNELS {
            self.filter
                .process(&mut self.buffer[channel..], AUDIO_BUFFER_SIZE, NUM_CHANNELS);
        }

        // Advance the playback position, clamping at the start of the
        // track on the low side.
        let delta = self.state.playback_step * AUDIO_BUFFER_SIZE as i32;

        if -delta > self.state.playback_offset {
            self.state.playback_offset = 0;
        } else {
            self.state.playback_offset += delta;
        }

        if self.state.flags & flag::LOOPING != 0 && self.state.has_valid_loop() {
            while self.state.playback_offset >= self.state.loop_end {
                self.state.playback_offset -= self.state.loop_end - self.state.loop_start;
            }
        }

        self.publish();
    }

    /// Update the playback step from a jog wheel delta
    ///
    /// The measured speed is smoothed, normalized so that nominal platter
    /// speed equals 1.0, then scaled to sampler units: at nominal speed
    /// the playhead advances one track sample per output sample times the
    /// ratio of the track rate to the output rate.
    pub fn update_measured_speed(&mut self, encoder_delta: i16, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let speed = encoder_delta as f32 / dt * self.speed_scale;
        let speed = self.smoother.update(speed);

        let rate_ratio = self.state.sample_rate as f32 / OUTPUT_SAMPLE_RATE as f32;
        let step = speed * rate_ratio * SAMPLE_OFFSET_UNIT as f32;
        self.state.playback_step = step as i32;
    }

    /// Update the deck filter from its pot position
    ///
    /// The pot sweeps low-pass on the lower half and high-pass on the
    /// upper half, with a squared curve for finer control near the
    /// center.
    pub fn update_filter(&mut self, value: u8) {
        let mut cutoff = value as f32 / 127.5;

        let mode = if cutoff < 1.0 {
            BiquadMode::Lowpass
        } else {
            cutoff -= 1.0;
            BiquadMode::Highpass
        };

        self.filter.configure(mode, cutoff * cutoff, 1.0);
    }

    /// Apply one input frame's button events to this deck
    pub fn handle_buttons(
        &mut self,
        selector: i16,
        buttons: DeckButtons,
        commands: &mut dyn CommandSink,
    ) {
        let state = &mut self.state;

        if buttons.held & button::SHIFT != 0 {
            if selector < 0 {
                commands.prev_variant(self.index);
            } else if selector > 0 {
                commands.next_variant(self.index);
            }
            if selector != 0 {
                state.flags |= flag::SHIFT_USED;
            }

            if buttons.pressed & button::RESTART != 0 {
                state.playback_offset = 0;
            }
            if buttons.pressed & button::CUE_JUMP != 0 {
                state.playback_offset = state.cue_offset;
            }
            if buttons.pressed & button::CUE_SET != 0 {
                state.cue_offset = state.playback_offset;
            }
            if buttons.pressed & button::REVERSE != 0 {
                state.flags ^= flag::REVERSE;
            }

            if buttons.pressed & !button::SHIFT & button::DECK_MASK != 0 {
                state.flags |= flag::SHIFT_USED;
            }
        } else {
            if buttons.pressed & button::LOOP_IN != 0 {
                // Moving the start point past the end moves the whole
                // loop instead of inverting it.
                let length = if state.has_valid_loop() {
                    state.loop_end - state.loop_start
                } else {
                    0
                };

                let moved = state.loop_end >= 0 && state.loop_end < state.playback_offset;
                state.loop_start = state.playback_offset;
                if moved {
                    state.loop_end = state.playback_offset + length;
                }
            }

            if buttons.pressed & button::LOOP_OUT != 0
                && state.loop_start >= 0
                && state.playback_offset > state.loop_start
            {
                state.loop_end = state.playback_offset;
                state.flags |= flag::LOOPING;
            }

            if buttons.pressed & button::RELOOP != 0 && state.has_valid_loop() {
                state.flags ^= flag::LOOPING;
            }

            if buttons.pressed & button::PLAY != 0 {
                state.flags ^= flag::PLAYING;
            }

            // The monitor button doubles as shift: only toggle monitoring
            // when no other button was pressed while it was held.
            if buttons.released & button::MONITOR != 0
                && state.flags & flag::SHIFT_USED == 0
            {
                state.flags ^= flag::MONITORING;
            }

            state.flags &= !flag::SHIFT_USED;
        }
    }

    fn publish(&self) {
        self.atomics.store(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::sector_ring;
    use crate::track::CHUNK_INDEX_UNIT;

    struct NullCommands {
        prev: usize,
        next: usize,
    }

    impl CommandSink for NullCommands {
        fn prev_variant(&mut self, _deck: usize) {
            self.prev += 1;
        }

        fn next_variant(&mut self, _deck: usize) {
            self.next += 1;
        }
    }

    fn make_deck() -> (Deck, ring::Producer) {
        let config = CoreConfig::default();
        let (producer, consumer) = sector_ring(config.ring_sectors);
        let deck = Deck::new(0, consumer, Arc::new(DeckAtomics::new()), &config);

        (deck, producer)
    }

    fn press(deck: &mut Deck, bits: u16) {
        let buttons = DeckButtons {
            pressed: bits,
            released: 0,
            held: bits,
        };
        deck.handle_buttons(0, buttons, &mut NullCommands { prev: 0, next: 0 });
    }

    fn shift_press(deck: &mut Deck, bits: u16) {
        let buttons = DeckButtons {
            pressed: bits,
            released: 0,
            held: bits | button::SHIFT,
        };
        deck.handle_buttons(0, buttons, &mut NullCommands { prev: 0, next: 0 });
    }

    #[test]
    fn test_play_toggle() {
        let (mut deck, _producer) = make_deck();

        press(&mut deck, button::PLAY);
        assert_ne!(deck.state.flags & flag::PLAYING, 0);
        press(&mut deck, button::PLAY);
        assert_eq!(deck.state.flags & flag::PLAYING, 0);
    }

    #[test]
    fn test_edge_triggering_is_level_insensitive() {
        // A held button without a press edge must not re-trigger.
        let (mut deck, _producer) = make_deck();

        press(&mut deck, button::PLAY);
        assert_ne!(deck.state.flags & flag::PLAYING, 0);

        let held_only = DeckButtons {
            pressed: 0,
            released: 0,
            held: button::PLAY,
        };
        deck.handle_buttons(0, held_only, &mut NullCommands { prev: 0, next: 0 });
        assert_ne!(
            deck.state.flags & flag::PLAYING,
            0,
            "held level must not toggle again"
        );
    }

    #[test]
    fn test_loop_in_out_reloop() {
        let (mut deck, _producer) = make_deck();

        deck.state.playback_offset = 1_000;
        press(&mut deck, button::LOOP_IN);
        assert_eq!(deck.state.loop_start, 1_000);
        assert!(!deck.state.has_valid_loop());

        // LOOP_OUT before the start point is ignored.
        deck.state.playback_offset = 500;
        press(&mut deck, button::LOOP_OUT);
        assert!(!deck.state.has_valid_loop());

        deck.state.playback_offset = 3_000;
        press(&mut deck, button::LOOP_OUT);
        assert!(deck.state.has_valid_loop());
        assert_eq!(deck.state.loop_end, 3_000);
        assert_ne!(deck.state.flags & flag::LOOPING, 0);

        press(&mut deck, button::RELOOP);
        assert_eq!(deck.state.flags & flag::LOOPING, 0);
        press(&mut deck, button::RELOOP);
        assert_ne!(deck.state.flags & flag::LOOPING, 0);
    }

    #[test]
    fn test_loop_in_past_end_moves_loop() {
        let (mut deck, _producer) = make_deck();

        deck.state.loop_start = 1_000;
        deck.state.loop_end = 2_000;
        deck.state.playback_offset = 5_000;

        press(&mut deck, button::LOOP_IN);
        assert_eq!(deck.state.loop_start, 5_000);
        assert_eq!(deck.state.loop_end, 6_000, "loop keeps its length");
    }

    #[test]
    fn test_shift_actions() {
        let (mut deck, _producer) = make_deck();

        deck.state.playback_offset = 4_000;
        shift_press(&mut deck, button::CUE_SET);
        assert_eq!(deck.state.cue_offset, 4_000);

        deck.state.playback_offset = 9_000;
        shift_press(&mut deck, button::CUE_JUMP);
        assert_eq!(deck.state.playback_offset, 4_000);

        shift_press(&mut deck, button::RESTART);
        assert_eq!(deck.state.playback_offset, 0);

        shift_press(&mut deck, button::REVERSE);
        assert_ne!(deck.state.flags & flag::REVERSE, 0);
    }

    #[test]
    fn test_monitor_toggle_suppressed_after_shift_use() {
        let (mut deck, _producer) = make_deck();

        // Press reverse while shift held: marks shift as used.
        shift_press(&mut deck, button::REVERSE);
        assert_ne!(deck.state.flags & flag::SHIFT_USED, 0);

        // Releasing monitor must not toggle monitoring.
        let release = DeckButtons {
            pressed: 0,
            released: button::MONITOR,
            held: 0,
        };
        deck.handle_buttons(0, release, &mut NullCommands { prev: 0, next: 0 });
        assert_eq!(deck.state.flags & flag::MONITORING, 0);
        assert_eq!(deck.state.flags & flag::SHIFT_USED, 0, "flag clears");

        // A clean press/release cycle toggles.
        deck.handle_buttons(
            0,
            DeckButtons {
                pressed: 0,
                released: button::MONITOR,
                held: 0,
            },
            &mut NullCommands { prev: 0, next: 0 },
        );
        assert_ne!(deck.state.flags & flag::MONITORING, 0);
    }

    #[test]
    fn test_selector_requests_variants_only_with_shift() {
        let (mut deck, _producer) = make_deck();
        let mut commands = NullCommands { prev: 0, next: 0 };

        let shift_held = DeckButtons {
            pressed: 0,
            released: 0,
            held: button::SHIFT,
        };
        deck.handle_buttons(1, shift_held, &mut commands);
        deck.handle_buttons(-1, shift_held, &mut commands);
        assert_eq!((commands.next, commands.prev), (1, 1));

        let no_shift = DeckButtons::default();
        deck.handle_buttons(1, no_shift, &mut commands);
        assert_eq!(commands.next, 1, "selector without shift is for the UI");
    }

    #[test]
    fn test_process_advances_and_loops() {
        let (mut deck, _producer) = make_deck();

        deck.track_loaded(44_100);
        deck.state.playback_step = CHUNK_INDEX_UNIT / AUDIO_BUFFER_SIZE as i32;
        deck.state.loop_start = 0;
        deck.state.loop_end = 2 * CHUNK_INDEX_UNIT;
        deck.state.flags |= flag::LOOPING;

        // Each buffer advances exactly one chunk; the loop folds the
        // offset back into [start, end).
        for _ in 0..10 {
            deck.process();
            let offset = deck.state.playback_offset;
            assert!(
                (0..2 * CHUNK_INDEX_UNIT).contains(&offset),
                "offset {offset} escaped the loop"
            );
        }
    }

    #[test]
    fn test_process_clamps_at_track_start() {
        let (mut deck, _producer) = make_deck();

        deck.track_loaded(44_100);
        deck.state.playback_offset = 100;
        deck.state.playback_step = -10_000;

        deck.process();
        assert_eq!(deck.state.playback_offset, 0);
    }

    #[test]
    fn test_measured_speed_drives_step() {
        let config = CoreConfig::default();
        let (_, consumer) = sector_ring(4);
        let mut deck = Deck::new(0, consumer, Arc::new(DeckAtomics::new()), &config);
        deck.track_loaded(44_100);

        // Feed a steady nominal-speed rotation: steps_per_rev * rps
        // encoder steps per second, polled every 10ms.
        let steps_per_poll =
            (config.steps_per_rev as f32 * config.nominal_rps() * 0.01).round() as i16;
        for _ in 0..400 {
            deck.update_measured_speed(steps_per_poll, 0.01);
        }

        // The smoothed step should settle near 1.0x: one offset unit per
        // 1/16 sample, track rate equal to the output rate.
        let step = deck.state.playback_step;
        assert!(
            (14..=17).contains(&step),
            "step {step} not near {}",
            SAMPLE_OFFSET_UNIT
        );
    }

    #[test]
    fn test_underrun_outputs_silence_and_counts() {
        let (mut deck, _producer) = make_deck();

        deck.track_loaded(44_100);
        deck.state.playback_step = SAMPLE_OFFSET_UNIT;
        deck.process();

        assert!(deck.buffer().iter().all(|&s| s == 0));
        let (_, underruns) = deck.stream_stats();
        assert!(underruns > 0);
    }
}
