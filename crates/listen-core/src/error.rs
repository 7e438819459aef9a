//! Error types for loading, engine control and pre-playback validation

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a trial's stimuli
///
/// All of these are configuration errors: they are reported synchronously to
/// the caller of [`crate::stimulus::StimulusStore::load`] and playback must not
/// start.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Empty file list
    #[error("No stimulus files given")]
    NoStimuli,

    /// File not found or couldn't be opened
    #[error("Could not open file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container format not recognised
    #[error("Unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Packet or codec failure while decoding
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// No decodable audio track in the container
    #[error("No audio track found in {0}")]
    NoAudioTrack(PathBuf),

    /// The container does not declare a channel layout
    #[error("Unable to determine the channel count of {0}")]
    UnknownChannelCount(PathBuf),

    /// A file's channel count differs from the first file of the trial
    #[error("The number of audio channels in {path} is {found}; expected {expected}")]
    ChannelMismatch {
        path: PathBuf,
        found: usize,
        expected: usize,
    },

    /// More frames than a frame index can address
    #[error("Cannot open {path} because it has more than {max} samples per channel")]
    TooManyFrames { path: PathBuf, max: u64 },

    /// The file decoded to zero frames
    #[error("{0} contains no audio frames")]
    Empty(PathBuf),
}

/// Result type for stimulus loading
pub type LoadResult<T> = Result<T, LoadError>;

/// Rejected control-surface requests
///
/// Carries only scalars so it can be built on any thread without allocating.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EngineError {
    /// Stimulus index is neither -1 nor a valid store index
    #[error("Stimulus index {index} out of range (trial has {count} stimuli)")]
    StimulusOutOfRange { index: i32, count: usize },

    /// Loop bounds violate 0 <= start < end <= total
    #[error("Invalid loop bounds [{start}, {end}) for {total} frames")]
    InvalidLoopBounds { start: u64, end: u64, total: u64 },

    /// Seek target past the end of the stimuli
    #[error("Position {frame} out of range ({total} frames)")]
    PositionOutOfRange { frame: u64, total: u64 },

    /// Slider fraction outside 0.0..=1.0 or not finite
    #[error("Position fraction {0} outside 0.0..=1.0")]
    InvalidFraction(f64),
}

/// Device capability problems detected before playback starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device has fewer outputs than the stimuli have channels
    #[error("The number of audio channels in stimuli files ({required}) exceeds available device outputs ({available})")]
    InsufficientOutputChannels { required: usize, available: usize },
}

/// Check that a device can carry every stimulus channel
///
/// Stimulus channel `c` is routed to device output `c`; any additional device
/// outputs receive silence.
pub fn validate_output_channels(
    stimulus_channels: usize,
    device_channels: usize,
) -> Result<(), DeviceError> {
    if stimulus_channels > device_channels {
        return Err(DeviceError::InsufficientOutputChannels {
            required: stimulus_channels,
            available: device_channels,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_channel_validation() {
        assert!(validate_output_channels(2, 2).is_ok());
        assert!(validate_output_channels(2, 8).is_ok());
        assert_eq!(
            validate_output_channels(6, 2),
            Err(DeviceError::InsufficientOutputChannels {
                required: 6,
                available: 2
            })
        );
    }

    #[test]
    fn test_channel_mismatch_message_names_file() {
        let err = LoadError::ChannelMismatch {
            path: PathBuf::from("trial1/B.wav"),
            found: 1,
            expected: 2,
        };
        assert_eq!(
            err.to_string(),
            "The number of audio channels in trial1/B.wav is 1; expected 2"
        );
    }
}
