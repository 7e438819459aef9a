//! Clock-driven video stand-in
//!
//! The player has no video decoder. When a trial folder carries a video, a
//! `ClockVideo` takes its place: it keeps a position that advances with wall
//! time while "playing", so the engine's drift correction runs exactly as it
//! would against a real player. Resyncs are counted and reported on drop.

use std::path::{Path, PathBuf};
use std::time::Instant;

use listen_core::engine::VideoSync;

pub struct ClockVideo {
    path: PathBuf,
    /// Position at the last play/seek
    base: f64,
    /// Set while playing
    started: Option<Instant>,
    resyncs: u64,
}

impl ClockVideo {
    pub fn open(path: &Path) -> Self {
        log::info!("Video {} (clock-driven, no decoder)", path.display());
        Self {
            path: path.to_path_buf(),
            base: 0.0,
            started: None,
            resyncs: 0,
        }
    }

    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }
}

impl VideoSync for ClockVideo {
    fn is_open(&self) -> bool {
        true
    }

    fn is_playing(&self) -> bool {
        self.started.is_some()
    }

    fn position(&self) -> f64 {
        match self.started {
            Some(started) => self.base + started.elapsed().as_secs_f64(),
            None => self.base,
        }
    }

    fn set_position(&mut self, seconds: f64) {
        self.base = seconds;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
        self.resyncs += 1;
    }

    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.base = self.position();
        self.started = None;
    }
}

impl Drop for ClockVideo {
    fn drop(&mut self) {
        log::info!(
            "Video {} closed after {} resyncs",
            self.path.display(),
            self.resync_count()
        );
    }
}
