//! CPAL implementation of the audio sink
//!
//! Two independent output streams (main and monitor, possibly on
//! different devices) each drain a lock-free sample ring. The audio
//! task's [`CpalSink::feed`] pushes into both rings and sleeps while a
//! ring is full, which is exactly the pacing the engine expects from the
//! I²S driver it was written for: the device clock applies backpressure,
//! the callbacks never wait.
//!
//! `cpal::Stream` is not `Send`, so the stream handles stay with the
//! creating thread inside [`CpalOutput`] while the [`CpalSink`] half
//! moves into the audio task.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::types::{Sample, AUDIO_BUFFER_SIZE, NUM_CHANNELS, OUTPUT_SAMPLE_RATE};

use super::AudioOutError;

/// Ring depth per bus, in samples
///
/// Four engine buffers of headroom absorbs scheduling jitter between the
/// audio task and the device callbacks without adding meaningful latency.
const RING_CAPACITY: usize = AUDIO_BUFFER_SIZE * NUM_CHANNELS * 4;

/// Wait between retries when a device ring is full
const FEED_BACKOFF: Duration = Duration::from_micros(500);

/// Keeps the cpal streams alive; drop to stop output
pub struct CpalOutput {
    _main_stream: Stream,
    _monitor_stream: Stream,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open the output streams and return the sink half for the engine
    ///
    /// `main_device` / `monitor_device` select devices by name substring;
    /// `None` uses the default output device for both buses.
    pub fn start(
        main_device: Option<&str>,
        monitor_device: Option<&str>,
    ) -> Result<(Self, CpalSink), AudioOutError> {
        let main = find_device(main_device)?;
        let monitor = find_device(monitor_device)?;

        log::info!(
            "main output: {}, monitor output: {}",
            device_name(&main),
            device_name(&monitor)
        );

        let (main_tx, main_rx) = rtrb::RingBuffer::new(RING_CAPACITY);
        let (monitor_tx, monitor_rx) = rtrb::RingBuffer::new(RING_CAPACITY);

        let (main_stream, sample_rate) = build_stream(&main, main_rx)?;
        let (monitor_stream, _) = build_stream(&monitor, monitor_rx)?;

        main_stream
            .play()
            .map_err(|e| AudioOutError::StreamPlayError(format!("main: {e}")))?;
        monitor_stream
            .play()
            .map_err(|e| AudioOutError::StreamPlayError(format!("monitor: {e}")))?;

        log::info!("audio output running at {sample_rate}Hz");

        Ok((
            Self {
                _main_stream: main_stream,
                _monitor_stream: monitor_stream,
                sample_rate,
            },
            CpalSink {
                main: main_tx,
                monitor: monitor_tx,
            },
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// The `Send` half handed to the audio task
pub struct CpalSink {
    main: rtrb::Producer<Sample>,
    monitor: rtrb::Producer<Sample>,
}

impl crate::hal::AudioSink for CpalSink {
    fn feed(&mut self, main: &[Sample], monitor: &[Sample], frames: usize) {
        push_blocking(&mut self.main, &main[..frames * NUM_CHANNELS]);
        push_blocking(&mut self.monitor, &monitor[..frames * NUM_CHANNELS]);
    }
}

fn push_blocking(producer: &mut rtrb::Producer<Sample>, samples: &[Sample]) {
    for &sample in samples {
        loop {
            match producer.push(sample) {
                Ok(()) => break,
                Err(_) => std::thread::sleep(FEED_BACKOFF),
            }
        }
    }
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "unknown".to_string())
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, AudioOutError> {
    let host = cpal::default_host();

    match name {
        None => host.default_output_device().ok_or(AudioOutError::NoDevices),
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioOutError::ConfigError(e.to_string()))?
            .find(|device| device_name(device).contains(name))
            .ok_or_else(|| AudioOutError::DeviceNotFound(name.to_string())),
    }
}

/// Pick a stereo f32 output config at the engine rate if possible
fn output_config(device: &cpal::Device) -> Result<StreamConfig, AudioOutError> {
    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioOutError::ConfigError(e.to_string()))?
        .collect();

    let best = configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= NUM_CHANNELS as u16)
        .find(|c| {
            (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&OUTPUT_SAMPLE_RATE)
        })
        .or_else(|| configs.iter().find(|c| c.channels() >= NUM_CHANNELS as u16))
        .or_else(|| configs.first())
        .ok_or_else(|| AudioOutError::ConfigError("no output configurations".to_string()))?;

    let sample_rate = if (best.min_sample_rate().0..=best.max_sample_rate().0)
        .contains(&OUTPUT_SAMPLE_RATE)
    {
        cpal::SampleRate(OUTPUT_SAMPLE_RATE)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "device does not support {OUTPUT_SAMPLE_RATE}Hz, using {}Hz (playback will be detuned)",
            fallback.0
        );
        fallback
    };

    Ok(StreamConfig {
        channels: best.channels(),
        sample_rate,
        buffer_size: cpal::BufferSize::Fixed(AUDIO_BUFFER_SIZE as u32),
    })
}

fn build_stream(
    device: &cpal::Device,
    mut ring: rtrb::Consumer<Sample>,
) -> Result<(Stream, u32), AudioOutError> {
    let config = output_config(device)?;
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    // Interleaved stereo from the ring; silence on
                    // underrun; extra device channels stay silent.
                    for (i, sample) in frame.iter_mut().enumerate() {
                        *sample = if i < NUM_CHANNELS {
                            ring.pop().unwrap_or(0) as f32 / 32_768.0
                        } else {
                            0.0
                        };
                    }
                }
            },
            move |error| {
                log::error!("audio stream error: {error}");
            },
            None,
        )
        .map_err(|e| AudioOutError::StreamBuildError(e.to_string()))?;

    Ok((stream, sample_rate))
}
