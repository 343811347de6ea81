//! Fractional-offset resampler over decoded sectors
//!
//! The sampler turns a playback offset and a signed per-sample step into
//! interleaved stereo output, linearly interpolating between adjacent
//! track samples at 1/16-sample resolution. Sectors are pulled from a
//! [`SectorSource`] on demand and decoded into a two-slot cache, so normal
//! playback decodes each sector exactly once and short reverse moves are
//! served entirely from the cache.

use crate::track::{Sector, CHUNK_INDEX_UNIT, SAMPLES_PER_SECTOR, SAMPLE_OFFSET_UNIT};
use crate::types::{fill_silence, Sample, NUM_CHANNELS};

/// Playback steps below this magnitude produce silence
///
/// A step under one offset unit cannot advance the playhead, and holding
/// the current sample would put DC on the outputs; a platter at rest must
/// be silent, not buzzing.
pub const STEP_THRESHOLD: i32 = 1;

const INVALID_CHUNK: i32 = i32::MIN;

/// Provider of raw sectors for the sampler
///
/// The audio path implementation skips stale ring entries until it finds
/// the requested chunk (see `engine::deck`); tests substitute direct
/// readers. `fetch` returning `None` means the chunk cannot be produced
/// right now (underrun or out of range) and the sampler substitutes
/// silence.
pub trait SectorSource {
    /// Borrow the raw sector for `chunk`
    fn fetch(&mut self, chunk: i32) -> Option<&Sector>;

    /// Consume the sector borrowed by the last successful `fetch`
    ///
    /// Called once the sampler has decoded it.
    fn release(&mut self);
}

struct CacheSlot {
    chunk: i32,
    samples: [Sample; SAMPLES_PER_SECTOR * NUM_CHANNELS],
}

/// Two-slot decoded-sector cache plus the resampling loop
pub struct Sampler {
    cache: [CacheSlot; 2],
    /// Slot holding the sector the playhead is in
    current: usize,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            cache: [
                CacheSlot {
                    chunk: INVALID_CHUNK,
                    samples: [0; SAMPLES_PER_SECTOR * NUM_CHANNELS],
                },
                CacheSlot {
                    chunk: INVALID_CHUNK,
                    samples: [0; SAMPLES_PER_SECTOR * NUM_CHANNELS],
                },
            ],
            current: 0,
        }
    }

    /// Invalidate both cache slots (e.g. after a track or variant change)
    pub fn flush(&mut self) {
        self.cache[0].chunk = INVALID_CHUNK;
        self.cache[1].chunk = INVALID_CHUNK;
    }

    /// Chunk indices currently cached, for diagnostics
    pub fn cached_chunks(&self) -> [i32; 2] {
        [self.cache[0].chunk, self.cache[1].chunk]
    }

    /// Ensure `chunk` is decoded, returning its slot index
    ///
    /// Cached chunks are returned without touching the source. On a miss
    /// the sector is decoded into the slot the playhead is *not* in:
    /// neighbor lookups for interpolation must never evict the sector
    /// being played, and a playhead crossing must keep the sector just
    /// left resident (it is still adjacent, and reverse playback reads it
    /// again immediately).
    ///
    /// `advance` marks playhead loads, which move `current` to the
    /// returned slot.
    fn load_chunk(&mut self, source: &mut dyn SectorSource, chunk: i32, advance: bool) -> usize {
        let slot = if self.cache[self.current].chunk == chunk {
            self.current
        } else if self.cache[self.current ^ 1].chunk == chunk {
            self.current ^ 1
        } else {
            let slot = self.current ^ 1;

            match source.fetch(chunk) {
                Some(sector) => {
                    sector.decode(&mut self.cache[slot].samples);
                    source.release();
                }
                None => fill_silence(&mut self.cache[slot].samples),
            }

            self.cache[slot].chunk = chunk;
            slot
        };

        if advance {
            self.current = slot;
        }
        slot
    }

    /// Produce `frames` interleaved stereo samples starting at `offset`
    ///
    /// `offset` and `step` are in 1/16-sample units; `step` may be
    /// negative for reverse playback. The number of source fetches is
    /// bounded by one per sector crossed plus one.
    pub fn process(
        &mut self,
        output: &mut [Sample],
        source: &mut dyn SectorSource,
        offset: i32,
        step: i32,
        frames: usize,
    ) {
        if step > -STEP_THRESHOLD && step < STEP_THRESHOLD {
            fill_silence(&mut output[..frames * NUM_CHANNELS]);
            return;
        }

        let mut chunk = offset.div_euclid(CHUNK_INDEX_UNIT);
        let mut local = offset.rem_euclid(CHUNK_INDEX_UNIT);

        let mut cur = self.load_chunk(source, chunk, true);
        let mut out = 0;

        for _ in 0..frames {
            let sample_idx = (local / SAMPLE_OFFSET_UNIT) as usize;
            let alpha = local % SAMPLE_OFFSET_UNIT;

            // The interpolation window may span into the next sector at
            // the last sample position.
            let (next, next_idx) = if sample_idx < SAMPLES_PER_SECTOR - 1 {
                (cur, sample_idx + 1)
            } else {
                (self.load_chunk(source, chunk + 1, false), 0)
            };

            for channel in 0..NUM_CHANNELS {
                let s1 = self.cache[cur].samples[sample_idx * NUM_CHANNELS + channel] as i32;
                let s2 = self.cache[next].samples[next_idx * NUM_CHANNELS + channel] as i32;

                let diff = (s2 - s1) * alpha / SAMPLE_OFFSET_UNIT;
                output[out + channel] = (s1 + diff) as Sample;
            }
            out += NUM_CHANNELS;

            local += step;
            if local >= CHUNK_INDEX_UNIT {
                chunk += 1;
                local -= CHUNK_INDEX_UNIT;
                cur = self.load_chunk(source, chunk, true);
            } else if local < 0 {
                chunk -= 1;
                local += CHUNK_INDEX_UNIT;
                cur = self.load_chunk(source, chunk, true);
            }
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
