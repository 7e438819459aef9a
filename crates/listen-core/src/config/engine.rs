//! Playback engine configuration
//!
//! Settings that are fixed for the lifetime of an engine. Changing any of
//! them takes effect the next time a trial is loaded.

use serde::{Deserialize, Serialize};

use crate::types::MAX_BLOCK_FRAMES;

/// Default tolerated drift between video and audio, in frames
/// 2000 frames @ 48kHz = ~42ms
pub const DEFAULT_VIDEO_DRIFT_TOLERANCE_FRAMES: u64 = 2000;

/// Default capacity of the render-event ring
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cross-fade over one block when switching stimuli
    /// Typically sounds better; some BS.1116 protocols require it off.
    /// Default: true
    pub crossfade: bool,

    /// Largest block the device may request, in frames
    /// Scratch buffers are pre-allocated to this size; larger blocks render silence.
    /// Default: 8192
    pub max_block_frames: usize,

    /// Video is re-positioned once it drifts further than this from the audio cursor
    /// Default: 2000 frames
    pub video_drift_tolerance_frames: u64,

    /// Slots in the render-thread event ring (events beyond this are dropped)
    /// Default: 256
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade: true,
            max_block_frames: MAX_BLOCK_FRAMES,
            video_drift_tolerance_frames: DEFAULT_VIDEO_DRIFT_TOLERANCE_FRAMES,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Config with cross-fading disabled (instant switches)
    pub fn without_crossfade() -> Self {
        Self {
            crossfade: false,
            ..Default::default()
        }
    }

    /// Set the pre-allocated block capacity
    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: EngineConfig = serde_yaml::from_str("crossfade: false\n").unwrap();
        assert!(!config.crossfade);
        assert_eq!(config.max_block_frames, MAX_BLOCK_FRAMES);
        assert_eq!(
            config.video_drift_tolerance_frames,
            DEFAULT_VIDEO_DRIFT_TOLERANCE_FRAMES
        );
    }
}
