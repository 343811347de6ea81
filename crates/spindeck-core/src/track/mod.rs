//! SST track file format
//!
//! A track file is laid out as:
//!
//! ```text
//! ┌──────────────────────┐ 0
//! │ Header (2048 bytes)  │   magic, rates, counts, key, pitch offsets,
//! │                      │   string pool
//! ├──────────────────────┤ 2048
//! │ Sector matrix        │   numChunks × numVariants sectors, row-major:
//! │                      │   sector(c, v) at (c·V + v) · 520... see below
//! ├──────────────────────┤ 2048 + numChunks · numVariants · SECTOR_SIZE
//! │ Waveform             │   4-bit peak summary, two nibbles per byte
//! └──────────────────────┘
//! ```
//!
//! All fields are little-endian. A sector holds one chunk of audio: two
//! per-channel [`Chunk`]s (left then right), each a predictor prologue
//! followed by [`BLOCKS_PER_SECTOR`] ADPCM blocks.

mod reader;

pub use reader::TrackReader;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::codec::{self, Block, SAMPLES_PER_BLOCK};
use crate::types::{Sample, NUM_CHANNELS};

/// ADPCM blocks per channel chunk
pub const BLOCKS_PER_SECTOR: usize = 21;

/// Decoded samples per sector (per channel)
pub const SAMPLES_PER_SECTOR: usize = SAMPLES_PER_BLOCK * BLOCKS_PER_SECTOR;

/// Fixed-point unit of playback offsets and steps: 1/16 of one sample
pub const SAMPLE_OFFSET_UNIT: i32 = 1 << 4;

/// Playback offset units per chunk
pub const CHUNK_INDEX_UNIT: i32 = SAMPLE_OFFSET_UNIT * SAMPLES_PER_SECTOR as i32;

/// Size of the on-disk header block
pub const HEADER_SIZE: usize = 2048;

/// Maximum number of pitch variants per track
pub const MAX_VARIANTS: usize = 16;

/// Pitch offset unit: 1/16 of a semitone
pub const PITCH_OFFSET_UNIT: i32 = 1 << 4;

/// Note names for key display, indexed by semitone from C
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

/// One channel's worth of a sector: predictor prologue plus blocks
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Chunk {
    pub s1: i16,
    pub s2: i16,
    pub blocks: [Block; BLOCKS_PER_SECTOR],
}

/// One on-disk sector: both channel chunks, left first
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Sector {
    pub channels: [Chunk; NUM_CHANNELS],
}

/// Size of one on-disk sector in bytes
pub const SECTOR_SIZE: usize = std::mem::size_of::<Sector>();

impl Sector {
    /// An all-zero sector (decodes to silence)
    pub fn zeroed() -> Self {
        Zeroable::zeroed()
    }

    /// Decode both channels into an interleaved stereo buffer
    ///
    /// `output` must hold at least `SAMPLES_PER_SECTOR * NUM_CHANNELS`
    /// samples.
    pub fn decode(&self, output: &mut [Sample]) {
        for (channel, chunk) in self.channels.iter().enumerate() {
            codec::decode_blocks(
                &mut output[channel..],
                chunk.s1,
                chunk.s2,
                &chunk.blocks,
                NUM_CHANNELS,
            );
        }
    }
}

/// Key scale of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyScale {
    #[default]
    Unknown,
    Major,
    Minor,
}

/// Errors produced by [`TrackReader`]
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an SST file (bad magic)")]
    BadMagic,

    #[error("unsupported sample rate: {0}")]
    BadSampleRate(u32),

    #[error("unsupported variant count: {0}")]
    BadVariantCount(u8),

    #[error("unsupported channel count: {0}")]
    BadChannelCount(u8),

    #[error("chunk {chunk} out of range (track has {num_chunks})")]
    ChunkOutOfRange { chunk: u32, num_chunks: u32 },

    #[error("no track is open")]
    NotOpen,
}

/// Parsed track header
#[derive(Debug, Clone)]
pub struct TrackHeader {
    pub sample_rate: u32,
    pub num_chunks: u32,
    pub waveform_len: u32,
    pub num_variants: u8,
    pub key_scale: KeyScale,
    pub key_note: u8,
    /// Per-variant pitch offsets in 1/16 semitone units
    pub pitch_offsets: [i16; MAX_VARIANTS],

    pub track_number: u8,
    pub track_count: u8,
    pub disc_number: u8,
    pub disc_count: u8,

    string_offsets: [u16; 4],
    string_pool: Vec<u8>,
}

impl TrackHeader {
    /// Parse and validate a raw header block
    pub fn parse(raw: &[u8; HEADER_SIZE]) -> Result<Self, TrackError> {
        if &raw[0..4] != b"SST1" {
            return Err(TrackError::BadMagic);
        }

        let sample_rate = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let num_chunks = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let waveform_len = u32::from_le_bytes(raw[12..16].try_into().unwrap());
        let num_variants = raw[16];
        let num_channels = raw[17];

        if !(8_000..=192_000).contains(&sample_rate) {
            return Err(TrackError::BadSampleRate(sample_rate));
        }
        if num_variants < 1 || num_variants as usize > MAX_VARIANTS {
            return Err(TrackError::BadVariantCount(num_variants));
        }
        if num_channels as usize != NUM_CHANNELS {
            return Err(TrackError::BadChannelCount(num_channels));
        }

        let key_scale = match raw[18] {
            1 => KeyScale::Major,
            2 => KeyScale::Minor,
            _ => KeyScale::Unknown,
        };
        let key_note = raw[19] % 12;

        let mut pitch_offsets = [0i16; MAX_VARIANTS];
        for (i, offset) in pitch_offsets.iter_mut().enumerate() {
            let at = 20 + i * 2;
            *offset = i16::from_le_bytes(raw[at..at + 2].try_into().unwrap());
        }

        let mut string_offsets = [0u16; 4];
        for (i, offset) in string_offsets.iter_mut().enumerate() {
            let at = 52 + i * 2;
            *offset = u16::from_le_bytes(raw[at..at + 2].try_into().unwrap());
        }

        Ok(Self {
            sample_rate,
            num_chunks,
            waveform_len,
            num_variants,
            key_scale,
            key_note,
            pitch_offsets,
            track_number: raw[60],
            track_count: raw[61],
            disc_number: raw[62],
            disc_count: raw[63],
            string_offsets,
            string_pool: raw[64..].to_vec(),
        })
    }

    /// Byte offset of the sector matrix for `(chunk, variant)`
    pub fn sector_offset(&self, chunk: u32, variant: u8) -> u64 {
        let index = chunk as u64 * self.num_variants as u64 + variant as u64;

        HEADER_SIZE as u64 + index * SECTOR_SIZE as u64
    }

    /// Byte offset of the waveform region
    pub fn waveform_offset(&self) -> u64 {
        self.sector_offset(self.num_chunks, 0)
    }

    /// Variant whose pitch offset is closest to zero
    pub fn default_variant(&self) -> u8 {
        let variants = &self.pitch_offsets[..self.num_variants as usize];

        variants
            .iter()
            .enumerate()
            .min_by_key(|(_, &pitch)| (pitch as i32).abs())
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }

    /// Track duration in seconds
    pub fn duration(&self) -> f32 {
        let samples = self.num_chunks as u64 * SAMPLES_PER_SECTOR as u64;

        samples as f32 / self.sample_rate as f32
    }

    pub fn title(&self) -> &str {
        self.string_at(0)
    }

    pub fn artist(&self) -> &str {
        self.string_at(1)
    }

    pub fn album(&self) -> &str {
        self.string_at(2)
    }

    pub fn genre(&self) -> &str {
        self.string_at(3)
    }

    /// Musical key label for `variant`: note name shifted by the variant's
    /// pitch offset (rounded to the nearest semitone), `m` suffix when
    /// minor, `-` when the key is unknown
    pub fn key_name(&self, variant: u8) -> String {
        if self.key_scale == KeyScale::Unknown {
            return "-".to_string();
        }

        let pitch = self.pitch_offsets[variant as usize % MAX_VARIANTS] as i32;
        let key = self.key_note as i32 * PITCH_OFFSET_UNIT + pitch;
        let semitone = (key + PITCH_OFFSET_UNIT / 2).div_euclid(PITCH_OFFSET_UNIT);

        let mut name = NOTE_NAMES[semitone.rem_euclid(12) as usize].to_string();
        if self.key_scale == KeyScale::Minor {
            name.push('m');
        }

        name
    }

    fn string_at(&self, index: usize) -> &str {
        let start = self.string_offsets[index] as usize;

        let Some(pool) = self.string_pool.get(start..) else {
            return "";
        };
        let end = pool.iter().position(|&b| b == 0).unwrap_or(pool.len());

        std::str::from_utf8(&pool[..end]).unwrap_or("")
    }
}
