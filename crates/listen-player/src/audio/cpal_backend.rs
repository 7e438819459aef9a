//! CPAL audio backend implementation
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───store(Release)───►│   EngineAtomics     │
//! │ (stdin / UI)     │                     │  (lock-free words)  │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ load(Acquire)
//!         │ pop()                                     ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   Event Ring     │◄──────push()────────│  CPAL Audio Thread  │
//! │  (rtrb SPSC)     │                     │ (owns PlaybackEngine)│
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The engine renders into a pre-allocated `ChannelBuffer`, which is then
//! interleaved into CPAL's device buffer. Stimulus channel `c` goes to device
//! channel `c`; remaining device channels are silent.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedBufferSize};

use listen_core::config::EngineConfig;
use listen_core::engine::{EngineControl, PlaybackEngine, VideoSync};
use listen_core::stimulus::StimulusSet;
use listen_core::{validate_output_channels, ChannelBuffer};

use super::backend::{build_engine, latency_ms, AudioHandle, AudioSystemResult};
use super::config::AudioConfig;
use super::device::open_output_device;
use super::error::{AudioError, AudioResult};

/// CPAL-specific audio handle
///
/// Keeps the output stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    /// Output stream (taken on drop so it is gone before `running` is cleared)
    stream: Option<Stream>,
    /// Used to clear the running flag once the stream is gone
    control: EngineControl,
    /// Sample rate of the audio system
    sample_rate: u32,
    /// Actual buffer size in frames (as negotiated with the device)
    buffer_size: u32,
}

impl CpalAudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

impl Drop for CpalAudioHandle {
    fn drop(&mut self) {
        // Dropping the stream joins the callback thread
        drop(self.stream.take());
        self.control.set_running(false);
        log::info!("Audio stream stopped");
    }
}

/// Start the audio system with the given configuration
pub fn start_audio_system(
    config: &AudioConfig,
    stimuli: Arc<StimulusSet>,
    engine_config: &EngineConfig,
    video: Option<Box<dyn VideoSync>>,
) -> AudioResult<AudioSystemResult> {
    let device = open_output_device(config.device.as_ref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let required_channels = stimuli.channel_count();
    let target_sample_rate = config.sample_rate.unwrap_or(stimuli.sample_rate());
    let (supported_config, buffer_size) = get_output_config(
        &device,
        config,
        required_channels,
        target_sample_rate,
        engine_config.max_block_frames,
    )?;
    validate_output_channels(required_channels, supported_config.channels() as usize)?;

    let sample_rate = supported_config.sample_rate().0;
    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let latency_ms = latency_ms(buffer_size, sample_rate);

    log::info!(
        "Audio config: {} channels ({} used), {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        required_channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let (engine, control, events) = build_engine(stimuli, engine_config, sample_rate, video);

    let stream = build_output_stream(&device, &stream_config, engine)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    control.set_running(true);

    log::info!("Audio stream started");

    let handle = CpalAudioHandle {
        stream: Some(stream),
        control: control.clone(),
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult {
        handle: AudioHandle::Cpal(handle),
        control,
        events,
    })
}

/// Get the best output configuration for a device
///
/// Only f32 configurations are considered. Prefers one with enough channels
/// for the stimuli and the target sample rate in range.
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames)
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
    required_channels: usize,
    target_sample_rate: u32,
    max_block_frames: usize,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let Some(first) = supported_configs.first() else {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    };

    let f32_configs: Vec<_> = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();
    if f32_configs.is_empty() {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?} (f32 output required)",
            first.sample_format()
        )));
    }

    let rate_in_range = |c: &cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };
    let enough_channels = |c: &cpal::SupportedStreamConfigRange| c.channels() as usize >= required_channels;

    let best_config = f32_configs
        .iter()
        .copied()
        .find(|c| enough_channels(*c) && rate_in_range(*c))
        .or_else(|| f32_configs.iter().copied().find(|c| enough_channels(*c)))
        // Otherwise the widest one; channel validation rejects it with a clear message
        .or_else(|| f32_configs.iter().copied().max_by_key(|c| c.channels()))
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if rate_in_range(best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = cpal::SampleRate(
            target_sample_rate.clamp(best_config.min_sample_rate().0, best_config.max_sample_rate().0),
        );
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let max_frames = u32::try_from(max_block_frames).unwrap_or(u32::MAX);
    let mut buffer_size = config.buffer_size.resolve(max_frames);
    if let SupportedBufferSize::Range { min, max } = best_config.buffer_size() {
        buffer_size = buffer_size.clamp(*min, (*max).max(*min)).min(max_frames);
    }

    log::debug!(
        "Selected buffer size: {} frames for {:?}",
        buffer_size,
        config.buffer_size
    );

    Ok((best_config.clone().with_sample_rate(sample_rate), buffer_size))
}

/// Build the output stream; the engine moves into the callback
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: PlaybackEngine,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut buffer = ChannelBuffer::silence(engine.channel_count(), engine.max_block_frames());

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = data.len() / channels;
                engine.render_block(&mut buffer, n_frames);
                buffer.write_interleaved(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
