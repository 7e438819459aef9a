//! Video synchronization capability
//!
//! Some trials pair the stimuli with a video. The engine treats the video as
//! the follower: audio position is authoritative, and the video is nudged back
//! whenever it drifts too far.

/// A video player the engine can keep in step with the audio cursor
///
/// Methods are called from the render thread, so implementations must not
/// block for long. Positions are in seconds.
pub trait VideoSync: Send {
    /// A video file is loaded
    fn is_open(&self) -> bool;

    fn is_playing(&self) -> bool;

    /// Current video position in seconds
    fn position(&self) -> f64;

    /// Jump to `seconds`
    fn set_position(&mut self, seconds: f64);

    fn play(&mut self);

    fn stop(&mut self);
}

/// No video attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVideo;

impl VideoSync for NoVideo {
    fn is_open(&self) -> bool {
        false
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn position(&self) -> f64 {
        0.0
    }

    fn set_position(&mut self, _seconds: f64) {}

    fn play(&mut self) {}

    fn stop(&mut self) {}
}
