//! Backend-independent audio system types and startup
//!
//! Both backends follow the same ownership model:
//! - The device callback owns the `PlaybackEngine` outright (moved in, no mutex)
//! - The control thread keeps an `EngineControl` (atomics) and `EngineEvents` (ring)
//! - Dropping the `AudioHandle` stops the callback before it returns

use std::sync::Arc;

use listen_core::config::EngineConfig;
use listen_core::engine::{EngineControl, EngineEvents, PlaybackEngine, VideoSync};
use listen_core::stimulus::StimulusSet;

use super::config::AudioConfig;
use super::error::AudioResult;

/// Result of starting the audio system
///
/// Contains the handle that keeps audio running and everything the control
/// thread needs to drive the engine.
pub struct AudioSystemResult {
    /// Handle to keep audio alive (drop or `stop()` to end playback)
    pub handle: AudioHandle,
    /// Lock-free control surface for the running engine
    pub control: EngineControl,
    /// Notifications from the render thread
    pub events: EngineEvents,
}

/// Handle to the active audio system
///
/// Keeps the stream/client alive. Dropping it is synchronous: once the drop
/// returns no further render calls happen, so the stimuli can be released.
pub enum AudioHandle {
    /// CPAL-based handle (Windows/macOS/Linux fallback)
    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    Cpal(super::cpal_backend::CpalAudioHandle),

    /// Native JACK handle (Linux with jack-backend feature)
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    Jack(super::jack_backend::JackAudioHandle),
}

impl AudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.sample_rate(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.sample_rate(),
        }
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.buffer_size(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.buffer_size(),
        }
    }

    /// Get the audio latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        latency_ms(self.buffer_size(), self.sample_rate())
    }

    /// Stop the device; returns once the render callback can no longer run
    pub fn stop(self) {
        drop(self);
    }
}

/// One-way output latency for a buffer size
pub(crate) fn latency_ms(buffer_size: u32, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    (buffer_size as f32 / sample_rate as f32) * 1000.0
}

/// Build the engine for a negotiated sample rate and attach the video, if any
pub(crate) fn build_engine(
    stimuli: Arc<StimulusSet>,
    engine_config: &EngineConfig,
    sample_rate: u32,
    video: Option<Box<dyn VideoSync>>,
) -> (PlaybackEngine, EngineControl, EngineEvents) {
    if stimuli.sample_rate() != sample_rate {
        log::warn!(
            "Device runs at {}Hz but the stimuli are {}Hz; playback speed will be off",
            sample_rate,
            stimuli.sample_rate()
        );
    }

    let (mut engine, control, events) = PlaybackEngine::new(stimuli, engine_config, sample_rate);
    if let Some(video) = video {
        engine.attach_video(video);
    }
    (engine, control, events)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Platform-specific audio system startup
// ═══════════════════════════════════════════════════════════════════════════════

/// Open the output device and start rendering the given trial
///
/// Automatically selects the appropriate backend:
/// - **Linux with jack-backend feature**: Native JACK, one port per stimulus channel
/// - **Other platforms**: CPAL
///
/// Fails before any stream is started if the device cannot carry every
/// stimulus channel. The engine starts paused with nothing selected.
pub fn start_audio_system(
    config: &AudioConfig,
    stimuli: Arc<StimulusSet>,
    engine_config: &EngineConfig,
    video: Option<Box<dyn VideoSync>>,
) -> AudioResult<AudioSystemResult> {
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    {
        super::jack_backend::start_audio_system(config, stimuli, engine_config, video)
    }

    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    {
        super::cpal_backend::start_audio_system(config, stimuli, engine_config, video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listen_core::stimulus::Stimulus;

    #[test]
    fn test_latency() {
        assert!((latency_ms(480, 48000) - 10.0).abs() < 1e-4);
        assert_eq!(latency_ms(512, 0), 0.0);
    }

    #[test]
    fn test_build_engine_starts_paused() {
        let set = StimulusSet::new(vec![Stimulus::new("a.wav", 48000, vec![vec![0.5; 100]])]).unwrap();
        let (engine, control, _events) = build_engine(Arc::new(set), &EngineConfig::default(), 44100, None);

        assert_eq!(engine.sample_rate(), 44100);
        assert!(control.is_paused());
        assert!(!control.is_running());
        assert_eq!(control.total_frames(), 100);
    }
}
