//! Control surface for a running engine
//!
//! `EngineControl` is the only way the UI or a test driver talks to the render
//! thread. Every method is a bounded number of atomic operations: nothing here
//! blocks, allocates or waits for the render thread to acknowledge.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::atomics::{pack_bounds, unpack_bounds, EngineAtomics};
use crate::error::EngineError;
use crate::types::NO_STIMULUS;

/// Cloneable, thread-safe handle to an engine's shared state
#[derive(Clone)]
pub struct EngineControl {
    atomics: Arc<EngineAtomics>,
    stimulus_count: usize,
    total_frames: u32,
    channel_count: usize,
}

impl EngineControl {
    pub(crate) fn new(
        atomics: Arc<EngineAtomics>,
        stimulus_count: usize,
        total_frames: u32,
        channel_count: usize,
    ) -> Self {
        Self {
            atomics,
            stimulus_count,
            total_frames,
            channel_count,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────

    /// Request a stimulus switch (-1 = silence)
    ///
    /// The switch happens at the next block boundary. Re-selecting the active
    /// stimulus cancels any pending switch and otherwise changes nothing.
    pub fn select_stimulus(&self, index: i32) -> Result<(), EngineError> {
        if index != NO_STIMULUS && (index < 0 || index as usize >= self.stimulus_count) {
            return Err(EngineError::StimulusOutOfRange {
                index,
                count: self.stimulus_count,
            });
        }
        self.atomics
            .requested_stimulus
            .store(index, Ordering::Release);
        Ok(())
    }

    /// Set both loop bounds at once; requires `start < end <= total_frames`
    pub fn set_loop_bounds(&self, start: u64, end: u64) -> Result<(), EngineError> {
        let (start, end) = self.check_bounds(start, end)?;
        self.atomics
            .loop_bounds
            .store(pack_bounds(start, end), Ordering::Release);
        Ok(())
    }

    /// Move the loop start, keeping the current end
    pub fn set_loop_start(&self, start: u64) -> Result<(), EngineError> {
        self.update_bounds(|_, end| (start, end as u64))
    }

    /// Move the loop end, keeping the current start
    pub fn set_loop_end(&self, end: u64) -> Result<(), EngineError> {
        self.update_bounds(|start, _| (start as u64, end))
    }

    /// Wrap at loop end (true) or stop there (false)
    pub fn set_loop_enabled(&self, enabled: bool) {
        self.atomics.loop_enabled.store(enabled, Ordering::Release);
    }

    /// Request a jump to `frame`, applied at the next block boundary
    ///
    /// The render thread clamps the target into the loop region.
    pub fn seek(&self, frame: u64) -> Result<(), EngineError> {
        if frame >= self.total_frames as u64 {
            return Err(EngineError::PositionOutOfRange {
                frame,
                total: self.total_frames as u64,
            });
        }
        self.atomics.request_seek(frame);
        Ok(())
    }

    /// Pause playback (idempotent)
    pub fn pause(&self) {
        self.atomics.paused.store(true, Ordering::Release);
    }

    /// Resume playback (idempotent)
    pub fn resume(&self) {
        self.atomics.paused.store(false, Ordering::Release);
    }

    /// Mark the device callback as live or stopped
    ///
    /// Called by the device backend when a stream starts and after it stops.
    pub fn set_running(&self, running: bool) {
        self.atomics.running.store(running, Ordering::Release);
    }

    // ─────────────────────────────────────────────────────────────
    // Slider helpers (0.0 ..= 1.0 of the common length)
    // ─────────────────────────────────────────────────────────────

    /// Seek to a fraction of the stimulus length
    ///
    /// `1.0` maps to the frame after the last one and is rejected.
    pub fn seek_fraction(&self, fraction: f64) -> Result<(), EngineError> {
        let frame = self.fraction_to_frame(fraction)?;
        self.seek(frame)
    }

    /// Move the loop start to a fraction of the stimulus length
    pub fn set_loop_start_fraction(&self, fraction: f64) -> Result<(), EngineError> {
        let frame = self.fraction_to_frame(fraction)?;
        self.set_loop_start(frame)
    }

    /// Move the loop end to a fraction of the stimulus length
    pub fn set_loop_end_fraction(&self, fraction: f64) -> Result<(), EngineError> {
        let frame = self.fraction_to_frame(fraction)?;
        self.set_loop_end(frame)
    }

    /// Set both loop bounds from fractions in one store
    pub fn set_loop_bounds_fraction(&self, start: f64, end: f64) -> Result<(), EngineError> {
        let start = self.fraction_to_frame(start)?;
        let end = self.fraction_to_frame(end)?;
        self.set_loop_bounds(start, end)
    }

    /// Cursor as a fraction of the stimulus length
    pub fn position_fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.cursor_position() as f64 / self.total_frames as f64
    }

    // ─────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────

    /// Stimulus the render thread is playing (-1 = none)
    pub fn current_stimulus(&self) -> i32 {
        self.atomics.active_stimulus()
    }

    /// Last requested stimulus (-1 = none)
    pub fn requested_stimulus(&self) -> i32 {
        self.atomics.requested_stimulus()
    }

    /// Read position in frames as of the last rendered block
    pub fn cursor_position(&self) -> u64 {
        self.atomics.cursor()
    }

    pub fn is_paused(&self) -> bool {
        self.atomics.is_paused()
    }

    pub fn is_running(&self) -> bool {
        self.atomics.is_running()
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.atomics.loop_enabled()
    }

    /// Loop region `[start, end)` in frames
    pub fn loop_bounds(&self) -> (u64, u64) {
        let (start, end) = self.atomics.loop_bounds();
        (start as u64, end as u64)
    }

    /// Common length of the stimuli in frames
    pub fn total_frames(&self) -> u64 {
        self.total_frames as u64
    }

    /// Number of loaded stimuli
    pub fn stimulus_count(&self) -> usize {
        self.stimulus_count
    }

    /// Channels per stimulus
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Cursor in seconds at the given device sample rate
    pub fn current_time_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.cursor_position() as f64 / sample_rate as f64
    }

    /// Render anomalies since the engine was created
    pub fn anomaly_count(&self) -> u64 {
        self.atomics.anomaly_count()
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn check_bounds(&self, start: u64, end: u64) -> Result<(u32, u32), EngineError> {
        if start >= end || end > self.total_frames as u64 {
            return Err(EngineError::InvalidLoopBounds {
                start,
                end,
                total: self.total_frames as u64,
            });
        }
        // end <= total_frames <= u32::MAX
        Ok((start as u32, end as u32))
    }

    /// Compare-and-swap one side of the packed bounds
    fn update_bounds(
        &self,
        f: impl Fn(u32, u32) -> (u64, u64),
    ) -> Result<(), EngineError> {
        let mut rejected = None;
        let result = self.atomics.loop_bounds.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |packed| {
                let (start, end) = unpack_bounds(packed);
                let (new_start, new_end) = f(start, end);
                match self.check_bounds(new_start, new_end) {
                    Ok((s, e)) => Some(pack_bounds(s, e)),
                    Err(e) => {
                        rejected = Some(e);
                        None
                    }
                }
            },
        );
        match (result, rejected) {
            (Ok(_), _) => Ok(()),
            (Err(_), Some(e)) => Err(e),
            // fetch_update only fails when the closure returns None
            (Err(_), None) => Ok(()),
        }
    }

    fn fraction_to_frame(&self, fraction: f64) -> Result<u64, EngineError> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(EngineError::InvalidFraction(fraction));
        }
        Ok((fraction * self.total_frames as f64).floor() as u64)
    }
}

impl std::fmt::Debug for EngineControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineControl")
            .field("stimulus_count", &self.stimulus_count)
            .field("total_frames", &self.total_frames)
            .field("channel_count", &self.channel_count)
            .field("cursor", &self.cursor_position())
            .field("active", &self.current_stimulus())
            .field("paused", &self.is_paused())
            .finish()
    }
}
