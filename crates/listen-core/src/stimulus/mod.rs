//! Stimulus store - decoded PCM for the active trial
//!
//! Loading is a blocking, two-pass operation that must run while the audio
//! device is stopped:
//!
//! 1. **Header**: read every file header, check that all files share the first
//!    file's channel count and that no file is too long to index.
//! 2. **Decode**: decode every file to channel-separated f32 and record its
//!    real length. The trial's common frame count is the shortest file.
//!
//! The decoded set is immutable once loaded and shared with the engine as an
//! `Arc<StimulusSet>`, so the render thread reads it without locking.

mod decode;

pub use decode::{decode, read_header, DecodedAudio, StimulusInfo};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::types::Sample;

/// Largest addressable frame count (frame indices are packed into 32 bits)
pub const MAX_STIMULUS_FRAMES: u64 = u32::MAX as u64;

/// One decoded stimulus
#[derive(Debug, Clone)]
pub struct Stimulus {
    path: PathBuf,
    sample_rate: u32,
    channels: Vec<Vec<Sample>>,
}

impl Stimulus {
    /// Build a stimulus from channel-separated samples
    ///
    /// All channels must have the same length.
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: Vec<Vec<Sample>>) -> Self {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        assert!(
            channels.iter().all(|c| c.len() == frames),
            "Channel lengths must match"
        );
        Self {
            path: path.into(),
            sample_rate,
            channels,
        }
    }

    /// Source file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate of the source file in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// This file's own length in frames (may exceed the trial's common length)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Samples of one channel
    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.channels[ch]
    }
}

/// All stimuli of one trial, sharing a channel count and a common length
#[derive(Debug, Clone)]
pub struct StimulusSet {
    stimuli: Vec<Stimulus>,
    channel_count: usize,
    frame_count: usize,
    sample_rate: u32,
}

impl StimulusSet {
    /// Assemble a set from already-decoded stimuli
    ///
    /// Fails if the list is empty, any stimulus is empty, or channel counts differ.
    pub fn new(stimuli: Vec<Stimulus>) -> LoadResult<Self> {
        let first = stimuli.first().ok_or(LoadError::NoStimuli)?;
        let channel_count = first.channel_count();
        let sample_rate = first.sample_rate();

        for stimulus in &stimuli {
            if stimulus.channel_count() != channel_count {
                return Err(LoadError::ChannelMismatch {
                    path: stimulus.path.clone(),
                    found: stimulus.channel_count(),
                    expected: channel_count,
                });
            }
            if stimulus.frames() == 0 {
                return Err(LoadError::Empty(stimulus.path.clone()));
            }
            if stimulus.frames() as u64 > MAX_STIMULUS_FRAMES {
                return Err(LoadError::TooManyFrames {
                    path: stimulus.path.clone(),
                    max: MAX_STIMULUS_FRAMES,
                });
            }
            if stimulus.sample_rate() != sample_rate {
                log::warn!(
                    "{:?} is {}Hz but the trial runs at {}Hz; it will play at the wrong speed",
                    stimulus.path,
                    stimulus.sample_rate(),
                    sample_rate
                );
            }
        }

        let frame_count = stimuli.iter().map(Stimulus::frames).min().unwrap_or(0);

        Ok(Self {
            stimuli,
            channel_count,
            frame_count,
            sample_rate,
        })
    }

    /// Number of stimuli
    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    /// Always false for a successfully built set
    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    /// Shared channel count `C`
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Common frame count `N` (shortest file)
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Sample rate of the first file
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get a stimulus by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Stimulus> {
        self.stimuli.get(index)
    }

    /// Iterate over the stimuli in load order
    pub fn iter(&self) -> impl Iterator<Item = &Stimulus> {
        self.stimuli.iter()
    }
}

/// Owner of the current trial's decoded stimuli
///
/// Lives on the control thread. The engine only ever receives the immutable
/// `Arc<StimulusSet>` handed out by [`StimulusStore::stimuli`].
#[derive(Debug, Default)]
pub struct StimulusStore {
    current: Option<Arc<StimulusSet>>,
}

impl StimulusStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a trial's stimulus files, replacing anything previously loaded
    ///
    /// Returns `(channel_count, frame_count)`. On error the store is left empty.
    /// Blocks on file I/O and decoding: never call this from the audio thread.
    pub fn load<P: AsRef<Path>>(&mut self, files: &[P]) -> LoadResult<(usize, usize)> {
        self.release_all();

        if files.is_empty() {
            return Err(LoadError::NoStimuli);
        }

        // Pass 1: headers only, so a mismatch fails before decoding anything
        let mut expected_channels: Option<usize> = None;
        for file in files {
            let path = file.as_ref();
            let info = read_header(path)?;

            if let Some(channels) = info.channels {
                match expected_channels {
                    None => expected_channels = Some(channels),
                    Some(expected) if expected != channels => {
                        return Err(LoadError::ChannelMismatch {
                            path: path.to_path_buf(),
                            found: channels,
                            expected,
                        });
                    }
                    Some(_) => {}
                }
            }

            if info.frames.is_some_and(|frames| frames > MAX_STIMULUS_FRAMES) {
                return Err(LoadError::TooManyFrames {
                    path: path.to_path_buf(),
                    max: MAX_STIMULUS_FRAMES,
                });
            }
        }

        // Pass 2: decode
        let mut stimuli = Vec::with_capacity(files.len());
        for file in files {
            let path = file.as_ref();
            log::debug!("Loading stimulus {:?}", path);
            let audio = decode(path)?;
            stimuli.push(Stimulus::new(path, audio.sample_rate, audio.channels));
        }

        let set = StimulusSet::new(stimuli)?;
        let shape = (set.channel_count(), set.frame_count());

        if set.iter().any(|s| s.frames() != set.frame_count()) {
            log::warn!(
                "Stimuli differ in length; playing the common {} frames",
                set.frame_count()
            );
        }
        log::info!(
            "Loaded {} stimuli: {} channels, {} frames @ {}Hz",
            set.len(),
            shape.0,
            shape.1,
            set.sample_rate()
        );

        self.current = Some(Arc::new(set));
        Ok(shape)
    }

    /// Drop all decoded buffers
    ///
    /// The device must already be stopped; if an engine still holds the set the
    /// memory is only reclaimed once that engine is dropped.
    pub fn release_all(&mut self) {
        if let Some(set) = self.current.take() {
            if Arc::strong_count(&set) > 1 {
                log::warn!("Releasing stimuli while an engine still references them");
            }
        }
    }

    /// Shared handle to the loaded set, for building an engine
    pub fn stimuli(&self) -> Option<Arc<StimulusSet>> {
        self.current.clone()
    }

    /// Channel count of the loaded set (0 when empty)
    pub fn channel_count(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.channel_count())
    }

    /// Common frame count of the loaded set (0 when empty)
    pub fn frame_count(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.frame_count())
    }

    /// Number of loaded stimuli
    pub fn len(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.len())
    }

    /// Check if nothing is loaded
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}
