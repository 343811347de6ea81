//! Shared fixtures for the integration tests
//!
//! Builds synthetic track files, provides in-memory HAL doubles, and
//! wires an engine instance that tests can step buffer-by-buffer without
//! spawning the real task threads.

#![allow(dead_code)]

pub mod encoder;

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use spindeck_core::dsp::WaveformEncoder;
use spindeck_core::engine::{self, AudioTask, CommandSink, Deck, DeckAtomics};
use spindeck_core::gc::Reclaimer;
use spindeck_core::hal::{AudioSink, BlockStorage, InputSnapshot, StorageFile};
use spindeck_core::ring::sector_ring;
use spindeck_core::stream::{self, StreamCommand, StreamTask};
use spindeck_core::track::{Sector, HEADER_SIZE, SAMPLES_PER_SECTOR};
use spindeck_core::types::{Sample, NUM_CHANNELS, NUM_DECKS};
use spindeck_core::ui::{details_cell, DeckView};
use spindeck_core::CoreConfig;

/// In-memory block storage
pub struct MemStorage {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemStorage {
    pub fn new(files: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(path, data)| (PathBuf::from(path), data))
                .collect(),
        }
    }
}

impl BlockStorage for MemStorage {
    fn open(&mut self, path: &Path) -> std::io::Result<Box<dyn StorageFile>> {
        match self.files.get(path) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        }
    }
}

/// Parameters of a synthetic track
pub struct TrackSpec {
    pub num_chunks: u32,
    pub sample_rate: u32,
    /// One pitch offset per variant, in 1/16 semitone
    pub pitch_offsets: Vec<i16>,
    /// Key scale byte (0/1/2) and note (0..11)
    pub key: (u8, u8),
}

impl Default for TrackSpec {
    fn default() -> Self {
        // The standard test track: 10.5s stereo at 44.1kHz, a second
        // variant one semitone up.
        Self {
            num_chunks: 1_000,
            sample_rate: 44_100,
            pitch_offsets: vec![0, 16],
            key: (2, 9), // A minor
        }
    }
}

/// Build a track whose every sector decodes to a constant value
///
/// Filter 0 with residual nibble 9 decodes each sample to exactly
/// `1 << gain` regardless of history, giving bit-exact expectations
/// without running the encoder.
pub fn constant_track(spec: &TrackSpec, gain: u8) -> Vec<u8> {
    let mut sector = Sector::zeroed();
    for channel in &mut sector.channels {
        for block in &mut channel.blocks {
            block.header = gain & 15;
            block.samples = [0x99; 11];
        }
    }

    let sectors = spec.num_chunks as usize * spec.pitch_offsets.len();
    let mut data = header_bytes(spec);
    for _ in 0..sectors {
        data.extend_from_slice(bytemuck::bytes_of(&sector));
    }
    data.extend(waveform_bytes(spec));
    data
}

fn header_bytes(spec: &TrackSpec) -> Vec<u8> {
    let mut raw = vec![0u8; HEADER_SIZE];
    raw[0..4].copy_from_slice(b"SST1");
    raw[4..8].copy_from_slice(&spec.sample_rate.to_le_bytes());
    raw[8..12].copy_from_slice(&spec.num_chunks.to_le_bytes());

    let waveform_len = waveform_bytes(spec).len() as u32;
    raw[12..16].copy_from_slice(&waveform_len.to_le_bytes());

    raw[16] = spec.pitch_offsets.len() as u8;
    raw[17] = NUM_CHANNELS as u8;
    raw[18] = spec.key.0;
    raw[19] = spec.key.1;

    for (i, &pitch) in spec.pitch_offsets.iter().enumerate() {
        raw[20 + i * 2..22 + i * 2].copy_from_slice(&pitch.to_le_bytes());
    }

    // String pool: title then artist.
    raw[52..54].copy_from_slice(&0u16.to_le_bytes());
    raw[54..56].copy_from_slice(&10u16.to_le_bytes());
    raw[64..73].copy_from_slice(b"Synthetic");
    raw[74..78].copy_from_slice(b"Test");

    raw
}

fn waveform_bytes(spec: &TrackSpec) -> Vec<u8> {
    // Summarize a constant mid-level signal with the real waveform
    // encoder; tests assert on layout, not shape.
    let samples = vec![8_192 as Sample; spec.num_chunks as usize * SAMPLES_PER_SECTOR];

    let mut output = Vec::new();
    WaveformEncoder::new().encode(&mut output, &samples, spec.sample_rate as i32, 1);
    output
}

/// Audio sink capturing everything the engine emits
#[derive(Clone, Default)]
pub struct CaptureSink {
    pub main: Arc<Mutex<Vec<Sample>>>,
    pub monitor: Arc<Mutex<Vec<Sample>>>,
}

impl AudioSink for CaptureSink {
    fn feed(&mut self, main: &[Sample], monitor: &[Sample], frames: usize) {
        self.main
            .lock()
            .unwrap()
            .extend_from_slice(&main[..frames * NUM_CHANNELS]);
        self.monitor
            .lock()
            .unwrap()
            .extend_from_slice(&monitor[..frames * NUM_CHANNELS]);
    }
}

struct RigCommands {
    commands: flume::Sender<StreamCommand>,
}

impl CommandSink for RigCommands {
    fn prev_variant(&mut self, deck: usize) {
        let _ = self.commands.try_send(StreamCommand::PrevVariant { deck });
    }

    fn next_variant(&mut self, deck: usize) {
        let _ = self.commands.try_send(StreamCommand::NextVariant { deck });
    }
}

/// A fully wired engine steppable from a single test thread
pub struct TestRig {
    pub audio: AudioTask,
    pub stream: StreamTask,
    pub inputs: rtrb::Producer<InputSnapshot>,
    pub commands: flume::Sender<StreamCommand>,
    pub views: [DeckView; NUM_DECKS],
    pub sink: CaptureSink,
    /// Owns the deferred-drop queue; tests never sweep it, the backing
    /// memory lives until the rig drops
    _gc: Reclaimer,
}

impl TestRig {
    pub fn new(storage: MemStorage, config: CoreConfig) -> Self {
        let (input_tx, input_rx) = engine::input_channel();
        let (event_tx, event_rx) = engine::event_channel();
        let (command_tx, command_rx) = stream::command_channel();

        let reclaimer = Reclaimer::new();
        let atomics: [Arc<DeckAtomics>; NUM_DECKS] =
            std::array::from_fn(|_| Arc::new(DeckAtomics::new()));
        let details = [
            details_cell(&reclaimer.handle()),
            details_cell(&reclaimer.handle()),
        ];

        let (ring0_tx, ring0_rx) = sector_ring(config.ring_sectors);
        let (ring1_tx, ring1_rx) = sector_ring(config.ring_sectors);

        let decks = [
            Deck::new(0, ring0_rx, Arc::clone(&atomics[0]), &config),
            Deck::new(1, ring1_rx, Arc::clone(&atomics[1]), &config),
        ];

        let sink = CaptureSink::default();

        let audio = AudioTask::new(
            decks,
            input_rx,
            event_rx,
            Box::new(RigCommands {
                commands: command_tx.clone(),
            }),
            Box::new(sink.clone()),
        );

        let stream = StreamTask::new(
            Box::new(storage),
            command_rx,
            [ring0_tx, ring1_tx],
            std::array::from_fn(|i| Arc::clone(&atomics[i])),
            event_tx,
            [Arc::clone(&details[0]), Arc::clone(&details[1])],
            reclaimer.handle(),
        );

        let views: [DeckView; NUM_DECKS] = std::array::from_fn(|i| {
            DeckView::new(Arc::clone(&atomics[i]), Arc::clone(&details[i]))
        });

        Self {
            audio,
            stream,
            inputs: input_tx,
            commands: command_tx,
            views,
            sink,
            _gc: reclaimer,
        }
    }

    /// Run the stream task until it has no more work
    pub fn pump_stream(&mut self) {
        while self.stream.poll_once() {}
    }

    /// One full cycle: stream keeps the rings charged, audio emits one
    /// buffer
    pub fn step(&mut self) {
        self.pump_stream();
        self.audio.process_buffer();
    }

    /// Step `count` buffers
    pub fn run_buffers(&mut self, count: usize) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Open a track and let the stream task process the command
    pub fn open(&mut self, deck: usize, path: &str) {
        self.commands
            .send(StreamCommand::Open {
                deck,
                path: PathBuf::from(path),
            })
            .unwrap();
        self.pump_stream();
        // Deliver the load event to the audio task.
        self.audio.process_buffer();
    }

    /// Push one input snapshot and process it
    pub fn apply_input(&mut self, snapshot: InputSnapshot) {
        self.inputs.push(snapshot).unwrap();
        self.step();
    }
}
