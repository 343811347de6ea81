//! The audio task: per-buffer processing loop
//!
//! # Real-time discipline
//!
//! The loop suspends in exactly one place: [`crate::hal::AudioSink::feed`].
//! Input snapshots and deck events arrive through wait-free `rtrb` queues
//! and are drained without blocking at the top of every iteration, so a
//! stalled I/O or stream task can never stall audio. Sector data arrives
//! through the per-deck rings inside [`Deck::process`]; an empty ring
//! degrades to silence, never to a wait.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::{Bitcrusher, Mixer};
use crate::hal::{AnalogInput, AudioSink, InputSnapshot};
use crate::types::{AudioBuffer, AUDIO_BUFFER_SIZE, NUM_CHANNELS, NUM_DECKS, SILENT_BUFFER};

use super::{CommandSink, Deck, DeckEvent};

/// Capacity of the input-snapshot queue (I/O task → audio task)
///
/// The I/O task produces one snapshot per ~10ms and the audio task drains
/// every ~5.8ms; 8 entries absorb scheduling jitter without adding
/// perceptible control latency.
pub const INPUT_QUEUE_CAPACITY: usize = 8;

/// Capacity of the deck-event queue (stream task → audio task)
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Create the input-snapshot channel feeding the audio task
pub fn input_channel() -> (rtrb::Producer<InputSnapshot>, rtrb::Consumer<InputSnapshot>) {
    rtrb::RingBuffer::new(INPUT_QUEUE_CAPACITY)
}

/// Create the deck-event channel feeding the audio task
pub fn event_channel() -> (rtrb::Producer<DeckEvent>, rtrb::Consumer<DeckEvent>) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}

/// The audio processing task
pub struct AudioTask {
    decks: [Deck; NUM_DECKS],
    main_mixer: Mixer,
    monitor_mixer: Mixer,
    /// One crusher per channel so held samples do not leak across the
    /// stereo interleave
    bitcrushers: [Bitcrusher; NUM_CHANNELS],

    main_buffer: AudioBuffer,
    monitor_buffer: AudioBuffer,

    inputs: rtrb::Consumer<InputSnapshot>,
    events: rtrb::Consumer<DeckEvent>,
    commands: Box<dyn CommandSink>,
    sink: Box<dyn AudioSink>,
}

impl AudioTask {
    pub fn new(
        decks: [Deck; NUM_DECKS],
        inputs: rtrb::Consumer<InputSnapshot>,
        events: rtrb::Consumer<DeckEvent>,
        commands: Box<dyn CommandSink>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            decks,
            main_mixer: Mixer::new(),
            monitor_mixer: Mixer::new(),
            bitcrushers: [Bitcrusher::new(), Bitcrusher::new()],
            main_buffer: SILENT_BUFFER,
            monitor_buffer: SILENT_BUFFER,
            inputs,
            events,
            commands,
            sink,
        }
    }

    pub fn deck(&self, index: usize) -> &Deck {
        &self.decks[index]
    }

    pub fn deck_mut(&mut self, index: usize) -> &mut Deck {
        &mut self.decks[index]
    }

    /// Run until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("audio task running");

        while !shutdown.load(Ordering::Relaxed) {
            self.process_buffer();
        }
    }

    /// Produce and emit exactly one buffer
    ///
    /// Public so tests (and offline renders) can step the engine
    /// deterministically.
    pub fn process_buffer(&mut self) {
        while let Ok(event) = self.events.pop() {
            self.handle_event(event);
        }
        while let Ok(snapshot) = self.inputs.pop() {
            self.handle_inputs(&snapshot);
        }

        for deck in &mut self.decks {
            deck.process();
        }

        let [deck0, deck1] = &self.decks;

        for channel in 0..NUM_CHANNELS {
            self.main_mixer.process(
                &mut self.main_buffer[channel..],
                &deck0.buffer()[channel..],
                &deck1.buffer()[channel..],
                AUDIO_BUFFER_SIZE,
                NUM_CHANNELS,
                NUM_CHANNELS,
            );
            self.monitor_mixer.process(
                &mut self.monitor_buffer[channel..],
                &deck0.buffer()[channel..],
                &deck1.buffer()[channel..],
                AUDIO_BUFFER_SIZE,
                NUM_CHANNELS,
                NUM_CHANNELS,
            );
            self.bitcrushers[channel].process(
                &mut self.main_buffer[channel..],
                AUDIO_BUFFER_SIZE,
                NUM_CHANNELS,
            );
        }

        self.sink
            .feed(&self.main_buffer, &self.monitor_buffer, AUDIO_BUFFER_SIZE);
    }

    fn handle_event(&mut self, event: DeckEvent) {
        match event {
            DeckEvent::Loaded { deck, sample_rate } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.track_loaded(sample_rate);
                }
            }
            DeckEvent::Unloaded { deck } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.track_unloaded();
                }
            }
            DeckEvent::VariantChanged { deck } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.variant_changed();
                }
            }
        }
    }

    /// Apply one input snapshot: speeds, filters, bus gains and buttons
    fn handle_inputs(&mut self, snapshot: &InputSnapshot) {
        let [deck0, deck1] = &mut self.decks;

        deck0.update_measured_speed(snapshot.deck_encoders[0], snapshot.dt);
        deck1.update_measured_speed(snapshot.deck_encoders[1], snapshot.dt);
        deck0.update_filter(snapshot.analog(AnalogInput::LeftFilter));
        deck1.update_filter(snapshot.analog(AnalogInput::RightFilter));

        let main_volume = snapshot.analog(AnalogInput::MainVolume) as f32 / 255.0;
        let monitor_volume = snapshot.analog(AnalogInput::MonitorVolume) as f32 / 255.0;
        let crossfade = snapshot.analog(AnalogInput::Crossfade) as f32 / 255.0;
        let effect_depth = snapshot.analog(AnalogInput::EffectDepth) as f32 / 255.0;

        self.main_mixer
            .configure((1.0 - crossfade) * main_volume, crossfade * main_volume);

        let monitor_gain = |deck: &Deck| {
            if deck.state.flags & super::flag::MONITORING != 0 {
                monitor_volume
            } else {
                0.0
            }
        };
        self.monitor_mixer
            .configure(monitor_gain(deck0), monitor_gain(deck1));

        for crusher in &mut self.bitcrushers {
            crusher.configure(effect_depth);
        }

        deck0.handle_buttons(
            snapshot.selector,
            snapshot.deck_buttons(0),
            self.commands.as_mut(),
        );
        deck1.handle_buttons(
            snapshot.selector,
            snapshot.deck_buttons(1),
            self.commands.as_mut(),
        );
    }
}
