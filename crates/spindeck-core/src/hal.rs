//! Hardware abstraction traits
//!
//! The core never talks to peripherals directly; hosts hand it
//! implementations of these traits at startup. The desktop build ships a
//! cpal-based [`AudioSink`] (see `audio_out`); everything else is provided
//! by the integrating firmware or by test doubles.

use std::io::{Read, Seek};
use std::path::Path;

use crate::types::{Sample, NUM_DECKS};

/// Number of analog input channels
pub const NUM_ANALOG_INPUTS: usize = 8;

/// Analog potentiometer channels, by input index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AnalogInput {
    LeftFilter = 0,
    RightFilter = 1,
    LeftSpeed = 2,
    RightSpeed = 3,
    MainVolume = 4,
    MonitorVolume = 5,
    Crossfade = 6,
    EffectDepth = 7,
}

/// Per-deck button bits (deck-local, 5 bits wide)
///
/// The same physical buttons read as the alternate set while the shift
/// (monitor) button is held.
pub mod button {
    /// Width of one deck's button field
    pub const DECK_MASK: u16 = 31;

    pub const LOOP_IN: u16 = 1 << 0;
    pub const LOOP_OUT: u16 = 1 << 1;
    pub const RELOOP: u16 = 1 << 2;
    pub const PLAY: u16 = 1 << 3;
    pub const MONITOR: u16 = 1 << 4;

    // Alternate actions while shift is held
    pub const RESTART: u16 = LOOP_IN;
    pub const CUE_JUMP: u16 = LOOP_OUT;
    pub const CUE_SET: u16 = RELOOP;
    pub const REVERSE: u16 = PLAY;
    pub const SHIFT: u16 = MONITOR;

    /// Global selector encoder push button
    pub const SELECTOR: u16 = 1 << 10;

    /// Bit shift of a deck's button field in the global mask
    pub const fn deck_shift(deck: usize) -> u16 {
        (deck * 5) as u16
    }
}

/// One poll of every physical input
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    /// Seconds elapsed since the previous poll
    pub dt: f32,
    /// Jog wheel encoder deltas, in encoder steps
    pub deck_encoders: [i16; NUM_DECKS],
    /// Selector encoder delta, in detents
    pub selector: i16,
    /// Buttons that went down since the previous poll
    pub buttons_pressed: u16,
    /// Buttons that went up since the previous poll
    pub buttons_released: u16,
    /// Buttons currently down
    pub buttons_held: u16,
    /// Raw 8-bit analog channel values
    pub analog: [u8; NUM_ANALOG_INPUTS],
}

impl InputSnapshot {
    /// Read one analog channel
    #[inline]
    pub fn analog(&self, input: AnalogInput) -> u8 {
        self.analog[input as usize]
    }

    /// Extract one deck's button events (deck-local bits)
    pub fn deck_buttons(&self, deck: usize) -> DeckButtons {
        let shift = button::deck_shift(deck);

        DeckButtons {
            pressed: (self.buttons_pressed >> shift) & button::DECK_MASK,
            released: (self.buttons_released >> shift) & button::DECK_MASK,
            held: (self.buttons_held >> shift) & button::DECK_MASK,
        }
    }
}

/// Deck-local button events extracted from an [`InputSnapshot`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeckButtons {
    pub pressed: u16,
    pub released: u16,
    pub held: u16,
}

/// Stereo audio output
///
/// `feed` blocks until both buses have accepted `frames` interleaved
/// stereo frames; this is the audio task's pacing point.
pub trait AudioSink: Send {
    fn feed(&mut self, main: &[Sample], monitor: &[Sample], frames: usize);
}

/// Encoder, button and potentiometer source
///
/// `poll` fills every field of the snapshot, including the elapsed time
/// since the previous poll. Called at a fixed period from the I/O task.
pub trait InputSource: Send {
    fn poll(&mut self, output: &mut InputSnapshot);
}

/// Platter motor outputs
pub trait MotorSink: Send {
    /// Drive a motor; `speed` is a signed duty factor in [-1, 1]
    fn drive(&mut self, deck: usize, speed: f32);

    /// Stop a motor, either coasting or braking
    fn stop(&mut self, deck: usize, brake: bool);
}

/// A readable, seekable track file
pub trait StorageFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> StorageFile for T {}

/// Block storage exposing a path namespace
///
/// The stream task owns the storage handle exclusively; readers use plain
/// seek + read on the returned files.
pub trait BlockStorage: Send {
    fn open(&mut self, path: &Path) -> std::io::Result<Box<dyn StorageFile>>;
}

/// [`BlockStorage`] over a directory of the host filesystem
pub struct FsStorage {
    root: std::path::PathBuf,
}

impl FsStorage {
    /// Create storage rooted at `root` (the SD card mount point)
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlockStorage for FsStorage {
    fn open(&mut self, path: &Path) -> std::io::Result<Box<dyn StorageFile>> {
        let path = if path.is_absolute() {
            self.root.join(path.strip_prefix("/").unwrap_or(path))
        } else {
            self.root.join(path)
        };

        Ok(Box::new(std::fs::File::open(path)?))
    }
}
