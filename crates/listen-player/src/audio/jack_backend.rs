//! Native JACK audio backend for Linux
//!
//! Registers one output port per stimulus channel (`out_1`, `out_2`, ...) and
//! connects them in order to the physical playback ports, starting at
//! `AudioConfig::first_output_port`. Used on Linux when the `jack-backend`
//! feature is enabled.
//!
//! JACK hands out one buffer per port, which is already the engine's
//! channel-separated layout, so each lane is copied straight across.

use std::sync::Arc;

use jack::{AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope};

use listen_core::config::EngineConfig;
use listen_core::engine::{EngineControl, PlaybackEngine, VideoSync};
use listen_core::stimulus::StimulusSet;
use listen_core::{validate_output_channels, ChannelBuffer};

use super::backend::{build_engine, latency_ms, AudioHandle, AudioSystemResult};
use super::config::AudioConfig;
use super::error::{AudioError, AudioResult};

/// JACK-specific audio handle
///
/// Keeps the JACK client active. Drop this to disconnect from JACK.
pub struct JackAudioHandle {
    /// The async client (taken on drop and deactivated)
    async_client: Option<jack::AsyncClient<JackNotifications, JackProcessor>>,
    /// Used to clear the running flag once the client is deactivated
    control: EngineControl,
    /// Sample rate from JACK server
    sample_rate: u32,
    /// Buffer size from JACK server
    buffer_size: u32,
}

impl JackAudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

impl Drop for JackAudioHandle {
    fn drop(&mut self) {
        if let Some(client) = self.async_client.take() {
            if let Err(e) = client.deactivate() {
                log::warn!("Failed to deactivate JACK client: {}", e);
            }
        }
        self.control.set_running(false);
        log::info!("JACK client deactivated");
    }
}

/// JACK process handler
///
/// Owns the PlaybackEngine exclusively - no mutex needed.
struct JackProcessor {
    /// One output port per stimulus channel
    ports: Vec<Port<AudioOut>>,
    /// The playback engine (OWNED, not shared)
    engine: PlaybackEngine,
    /// Pre-allocated render buffer
    buffer: ChannelBuffer,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let n_frames = ps.n_frames() as usize;
        self.engine.render_block(&mut self.buffer, n_frames);

        for (ch, port) in self.ports.iter_mut().enumerate() {
            let out = port.as_mut_slice(ps);
            let lane = self.buffer.channel(ch);
            let n = out.len().min(lane.len());
            out[..n].copy_from_slice(&lane[..n]);
            out[n..].fill(0.0);
        }

        Control::Continue
    }
}

/// JACK notification handler
struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::warn!("JACK sample rate changed to {}Hz during playback", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Port name for stimulus channel `ch` (0-based)
fn port_name(ch: usize) -> String {
    format!("out_{}", ch + 1)
}

/// Physical playback ports, in server order
fn physical_playback_ports(client: &Client) -> Vec<String> {
    let mut ports = client.ports(
        Some(".*:playback_.*"),
        None,
        PortFlags::IS_INPUT | PortFlags::IS_PHYSICAL,
    );
    ports.sort();
    ports
}

/// Start the JACK audio system
///
/// Creates a JACK client, checks there are enough physical outputs, registers
/// the ports and starts processing.
pub fn start_audio_system(
    config: &AudioConfig,
    stimuli: Arc<StimulusSet>,
    engine_config: &EngineConfig,
    video: Option<Box<dyn VideoSync>>,
) -> AudioResult<AudioSystemResult> {
    // JACK may rename if another client has the same name
    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| AudioError::ConfigError(format!("Failed to create JACK client: {}", e)))?;
    let actual_client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as u32;
    let buffer_size = client.buffer_size();
    let latency_ms = latency_ms(buffer_size, sample_rate);

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        actual_client_name,
        sample_rate,
        buffer_size,
        latency_ms
    );

    if config.buffer_size.as_frames().is_some_and(|frames| frames != buffer_size) {
        log::info!("JACK server decides the buffer size; ignoring {:?}", config.buffer_size);
    }
    if buffer_size as usize > engine_config.max_block_frames {
        log::warn!(
            "JACK buffer ({} frames) exceeds the engine block capacity ({}); output will be silent",
            buffer_size,
            engine_config.max_block_frames
        );
    }

    let channels = stimuli.channel_count();
    let playback_ports = physical_playback_ports(&client);
    let available = playback_ports.len().saturating_sub(config.first_output_port);
    validate_output_channels(channels, available)?;

    let ports = (0..channels)
        .map(|ch| {
            client
                .register_port(&port_name(ch), AudioOut::default())
                .map_err(|e| AudioError::ConfigError(format!("Failed to register port: {}", e)))
        })
        .collect::<AudioResult<Vec<_>>>()?;

    let (engine, control, events) = build_engine(stimuli, engine_config, sample_rate, video);

    let processor = JackProcessor {
        ports,
        buffer: ChannelBuffer::silence(channels, engine.max_block_frames()),
        engine,
    };

    let async_client = client
        .activate_async(JackNotifications, processor)
        .map_err(|e| AudioError::StreamPlayError(format!("Failed to activate JACK client: {}", e)))?;
    control.set_running(true);

    log::info!("JACK client activated");

    for (ch, target) in playback_ports
        .iter()
        .skip(config.first_output_port)
        .take(channels)
        .enumerate()
    {
        let source = format!("{}:{}", actual_client_name, port_name(ch));
        match async_client.as_client().connect_ports_by_name(&source, target) {
            Ok(()) => log::info!("Connected {} to {}", source, target),
            Err(e) => log::warn!("Could not connect {} to {}: {}", source, target, e),
        }
    }

    let handle = JackAudioHandle {
        async_client: Some(async_client),
        control: control.clone(),
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult {
        handle: AudioHandle::Jack(handle),
        control,
        events,
    })
}
