//! Audio device configuration
//!
//! Which device to open and how to ask for it. The device sample rate
//! normally follows the stimuli, so nothing is resampled.

use serde::{Deserialize, Serialize};

/// Buffer size used when no preference is given (frames)
/// 512 frames @ 48kHz = ~10.7ms
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest fixed buffer size we will request (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Default JACK client name
pub const DEFAULT_CLIENT_NAME: &str = "listen-player";

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick (512 frames for CPAL, server setting for JACK)
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }

    /// Requested frames clamped to `[MIN_BUFFER_SIZE, max_frames]`
    pub fn resolve(&self, max_frames: u32) -> u32 {
        self.as_frames()
            .unwrap_or(DEFAULT_BUFFER_SIZE)
            .clamp(MIN_BUFFER_SIZE, max_frames.max(MIN_BUFFER_SIZE))
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.) so
/// the same name on two hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, every host is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    /// Used by CPAL backend
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Device sample rate (None = the stimuli's own rate)
    pub sample_rate: Option<u32>,

    /// JACK client name
    pub client_name: String,

    /// First physical JACK playback port to connect stimulus channel 1 to
    /// 0 = system:playback_1
    pub first_output_port: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: BufferSize::default(),
            sample_rate: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            first_output_port: 0,
        }
    }
}
