//! Player configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/listening-test/config.yaml

use std::path::PathBuf;

use listen_core::config::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device settings
    pub audio: AudioConfig,
    /// Playback engine settings (cross-fade, block capacity, video tolerance)
    pub engine: EngineConfig,
    /// Start trials with looping enabled
    /// Default: true
    pub loop_playback: bool,
    /// Required number of stimuli per trial folder (None = any)
    pub expected_stimuli: Option<usize>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            engine: EngineConfig::default(),
            loop_playback: true,
            expected_stimuli: None,
        }
    }
}

/// Get the default config file path
///
/// Returns: `~/.config/listening-test/config.yaml` (platform config dir)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("listening-test")
        .join("config.yaml")
}
