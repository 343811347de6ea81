//! Offline SST ADPCM encoder
//!
//! The shipped core only decodes; this encoder exists so the tests can
//! author real track files and check the codec round trip. For each block
//! it brute-forces all filter/gain combinations and keeps the one with
//! the lowest squared error, exactly like the production encoding tool.

use spindeck_core::codec::{Block, FILTER_COEFFS, SAMPLES_PER_BLOCK};
use spindeck_core::track::{Chunk, BLOCKS_PER_SECTOR, SAMPLES_PER_SECTOR};
use spindeck_core::types::Sample;

const FILTER_BITS: i32 = 8;
const FILTER_UNIT: i32 = 1 << FILTER_BITS;

/// Streaming block encoder; predictor state carries across chunks
pub struct SstEncoder {
    s1: i32,
    s2: i32,
}

struct Candidate {
    block: Block,
    s1: i32,
    s2: i32,
    error: u64,
}

impl SstEncoder {
    pub fn new() -> Self {
        Self { s1: 0, s2: 0 }
    }

    pub fn reset(&mut self) {
        self.s1 = 0;
        self.s2 = 0;
    }

    /// Estimate the gain for a block under one filter
    ///
    /// The optimal gain is within one of
    /// `max(ceil(log2(|residual| + 1)), ...)`; a filter-only
    /// approximation of the encoder is good enough to seed the search.
    fn estimate_block_gain(&self, input: &[Sample; SAMPLES_PER_BLOCK], filter: usize) -> i32 {
        let (a1, a2) = FILTER_COEFFS[filter];
        let (mut s1, mut s2) = (self.s1, self.s2);

        let mut pos_peak = 0;
        let mut neg_peak = 0;

        for &sample in input {
            let sample = sample as i32;

            let mut encoded = sample * FILTER_UNIT;
            encoded -= a1 * s1;
            encoded -= a2 * s2;
            encoded -= FILTER_UNIT / 2;
            encoded /= FILTER_UNIT;

            pos_peak = pos_peak.max(encoded);
            neg_peak = neg_peak.min(encoded);

            s2 = s1;
            s1 = sample;
        }

        let mut shift = 0;
        while (pos_peak >> shift) > 7 {
            shift += 1;
        }
        while (neg_peak >> shift) < -8 {
            shift += 1;
        }

        shift.clamp(1, 11)
    }

    /// Encode one block with a fixed gain and filter, measuring the error
    fn try_encode_block(
        &self,
        input: &[Sample; SAMPLES_PER_BLOCK],
        gain: i32,
        filter: usize,
    ) -> Candidate {
        let (a1, a2) = FILTER_COEFFS[filter];
        let (mut s1, mut s2) = (self.s1, self.s2);

        let mut block = Block {
            header: (gain & 15) as u8 | ((filter as u8) << 4),
            samples: [0; 11],
        };

        let actual_gain = gain + FILTER_BITS;
        let mut total_error = 0u64;

        for (i, &sample) in input.iter().enumerate() {
            let sample = sample as i32;

            // Run the decoder's steps in reverse.
            let residual = a1 * s1 + a2 * s2 + FILTER_UNIT / 2;

            let mut encoded = sample * FILTER_UNIT;
            encoded -= residual;
            encoded >>= actual_gain;
            encoded = encoded.clamp(-8, 7);

            let nibble = (encoded + 8) as u8;
            if i % 2 == 0 {
                block.samples[i / 2] = nibble;
            } else {
                block.samples[i / 2] |= nibble << 4;
            }

            // Simulate decoding to measure the noise floor.
            let mut decoded = encoded << actual_gain;
            decoded += residual;
            decoded /= FILTER_UNIT;
            let decoded = decoded.clamp(Sample::MIN as i32, Sample::MAX as i32);

            let error = (sample - decoded) as i64;
            total_error += (error * error) as u64;

            s2 = s1;
            s1 = decoded;
        }

        Candidate {
            block,
            s1,
            s2,
            error: total_error,
        }
    }

    /// Encode one block, choosing the best filter/gain pair
    pub fn encode_block(&mut self, input: &[Sample; SAMPLES_PER_BLOCK]) -> Block {
        let mut best: Option<Candidate> = None;

        for filter in 0..FILTER_COEFFS.len() {
            let estimate = self.estimate_block_gain(input, filter);

            for gain in [estimate - 1, estimate] {
                let candidate = self.try_encode_block(input, gain.clamp(0, 15), filter);

                if best.as_ref().map(|b| candidate.error < b.error).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }

        let best = best.unwrap();
        self.s1 = best.s1;
        self.s2 = best.s2;
        best.block
    }

    /// Encode one channel's worth of a sector
    ///
    /// The chunk prologue is the encoder state before the first block, so
    /// chunks stay independently decodable.
    pub fn encode_chunk(&mut self, input: &[Sample; SAMPLES_PER_SECTOR]) -> Chunk {
        let mut chunk = Chunk {
            s1: self.s1 as i16,
            s2: self.s2 as i16,
            blocks: [Block {
                header: 0,
                samples: [0; 11],
            }; BLOCKS_PER_SECTOR],
        };

        for (i, window) in input.chunks(SAMPLES_PER_BLOCK).enumerate() {
            chunk.blocks[i] = self.encode_block(window.try_into().unwrap());
        }

        chunk
    }
}

impl Default for SstEncoder {
    fn default() -> Self {
        Self::new()
    }
}
