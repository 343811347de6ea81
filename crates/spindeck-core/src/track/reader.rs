//! Sector-indexed track file reader

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::hal::{BlockStorage, StorageFile};

use super::{Sector, TrackError, TrackHeader, HEADER_SIZE};

struct OpenTrack {
    file: Box<dyn StorageFile>,
    header: TrackHeader,
    waveform: Vec<u8>,
    variant: u8,
}

/// Reader over one variant-structured track file
///
/// Created empty; `open` loads and validates the header, preloads the
/// waveform summary and selects the variant whose pitch offset is closest
/// to zero. `read` fetches one raw sector of the current variant.
pub struct TrackReader {
    track: Option<OpenTrack>,
}

impl TrackReader {
    pub fn new() -> Self {
        Self { track: None }
    }

    /// Open a track, replacing any previously open one
    ///
    /// On failure the reader rolls back to the closed state.
    pub fn open(
        &mut self,
        storage: &mut dyn BlockStorage,
        path: &Path,
    ) -> Result<(), TrackError> {
        self.track = None;

        let mut file = storage.open(path)?;

        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact(&mut raw)?;
        let header = TrackHeader::parse(&raw)?;

        let mut waveform = vec![0u8; header.waveform_len as usize];
        file.seek(SeekFrom::Start(header.waveform_offset()))?;
        file.read_exact(&mut waveform)?;

        let variant = header.default_variant();

        log::info!(
            "opened track: \"{}\" ({} chunks, {} Hz, {} variants)",
            header.title(),
            header.num_chunks,
            header.sample_rate,
            header.num_variants
        );

        self.track = Some(OpenTrack {
            file,
            header,
            waveform,
            variant,
        });
        Ok(())
    }

    /// Close the current track, releasing the file and waveform
    pub fn close(&mut self) {
        self.track = None;
    }

    pub fn is_open(&self) -> bool {
        self.track.is_some()
    }

    pub fn header(&self) -> Option<&TrackHeader> {
        self.track.as_ref().map(|t| &t.header)
    }

    /// Preloaded waveform summary bytes
    pub fn waveform(&self) -> Option<&[u8]> {
        self.track.as_ref().map(|t| t.waveform.as_slice())
    }

    pub fn variant(&self) -> u8 {
        self.track.as_ref().map(|t| t.variant).unwrap_or(0)
    }

    /// Select a variant, clamped to the track's variant count
    pub fn set_variant(&mut self, variant: i32) {
        if let Some(track) = &mut self.track {
            track.variant = variant.clamp(0, track.header.num_variants as i32 - 1) as u8;
        }
    }

    /// Return to the default (closest-to-zero pitch) variant
    pub fn reset_variant(&mut self) {
        if let Some(track) = &mut self.track {
            track.variant = track.header.default_variant();
        }
    }

    /// Musical key label of the current variant
    pub fn key_name(&self) -> Option<String> {
        self.track.as_ref().map(|t| t.header.key_name(t.variant))
    }

    /// Read one raw sector of the current variant into `dest`
    pub fn read(&mut self, dest: &mut Sector, chunk: u32) -> Result<(), TrackError> {
        let track = self.track.as_mut().ok_or(TrackError::NotOpen)?;

        if chunk >= track.header.num_chunks {
            return Err(TrackError::ChunkOutOfRange {
                chunk,
                num_chunks: track.header.num_chunks,
            });
        }

        let offset = track.header.sector_offset(chunk, track.variant);
        track.file.seek(SeekFrom::Start(offset))?;
        track.file.read_exact(bytemuck::bytes_of_mut(dest))?;

        Ok(())
    }
}

impl Default for TrackReader {
    fn default() -> Self {
        Self::new()
    }
}
