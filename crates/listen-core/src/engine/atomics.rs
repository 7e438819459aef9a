//! Lock-free state shared between the control thread and the render thread
//!
//! Every field is a single machine word, so no reader can ever observe a
//! half-written value. Fields fall into two groups:
//!
//! - **Requests** (written by the control thread, consumed at the start of the
//!   next render block): requested stimulus, loop bounds, loop flag, seek,
//!   pause flag. Stored with `Release`, loaded with `Acquire`.
//! - **Status** (written by the render thread for UI polling): cursor, active
//!   stimulus, anomaly count. `Relaxed` is enough since they only need
//!   visibility, not synchronization with other memory.
//!
//! The loop bounds are a pair that must change together, so both are packed
//! into one `AtomicU64` (`start << 32 | end`).

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use crate::types::NO_STIMULUS;

/// Sentinel for "no seek pending"
const NO_SEEK: u64 = u64::MAX;

/// Pack a `[start, end)` pair into one word
#[inline]
pub(crate) fn pack_bounds(start: u32, end: u32) -> u64 {
    ((start as u64) << 32) | end as u64
}

/// Unpack a word written by [`pack_bounds`]
#[inline]
pub(crate) fn unpack_bounds(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

/// Atomic playback state for one engine
pub struct EngineAtomics {
    /// Stimulus the control side wants audible (-1 = none)
    pub(crate) requested_stimulus: AtomicI32,
    /// Stimulus the render thread is currently playing (-1 = none)
    pub(crate) active_stimulus: AtomicI32,
    /// Packed loop region `[start, end)` in frames
    pub(crate) loop_bounds: AtomicU64,
    /// Wrap at loop end instead of stopping
    pub(crate) loop_enabled: AtomicBool,
    /// Pending seek target in frames (`NO_SEEK` when none)
    pub(crate) seek_request: AtomicU64,
    /// Transport paused (written by both sides: control pause/resume, render at end-of-region)
    pub(crate) paused: AtomicBool,
    /// Device callback is live
    pub(crate) running: AtomicBool,
    /// Read position in frames, as of the last completed block
    pub(crate) cursor: AtomicU64,
    /// Render anomalies since the engine was created
    pub(crate) anomalies: AtomicU64,
}

impl EngineAtomics {
    /// Fresh trial state: paused, nothing selected, loop over `[0, total)`
    pub fn new(total_frames: u32) -> Self {
        Self {
            requested_stimulus: AtomicI32::new(NO_STIMULUS),
            active_stimulus: AtomicI32::new(NO_STIMULUS),
            loop_bounds: AtomicU64::new(pack_bounds(0, total_frames)),
            loop_enabled: AtomicBool::new(true),
            seek_request: AtomicU64::new(NO_SEEK),
            paused: AtomicBool::new(true),
            running: AtomicBool::new(false),
            cursor: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
        }
    }

    /// Current loop bounds as `(start, end)`
    #[inline]
    pub fn loop_bounds(&self) -> (u32, u32) {
        unpack_bounds(self.loop_bounds.load(Ordering::Acquire))
    }

    /// Post a seek for the next render block (replaces any pending one)
    #[inline]
    pub(crate) fn request_seek(&self, frame: u64) {
        self.seek_request.store(frame, Ordering::Release);
    }

    /// Consume the pending seek, if any (render thread)
    #[inline]
    pub(crate) fn take_seek(&self) -> Option<u64> {
        match self.seek_request.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            frame => Some(frame),
        }
    }

    /// Get current cursor (lock-free)
    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Get active stimulus (lock-free)
    #[inline]
    pub fn active_stimulus(&self) -> i32 {
        self.active_stimulus.load(Ordering::Relaxed)
    }

    /// Get requested stimulus (lock-free)
    #[inline]
    pub fn requested_stimulus(&self) -> i32 {
        self.requested_stimulus.load(Ordering::Acquire)
    }

    /// Check if paused (lock-free)
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Check if the device callback is live (lock-free)
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if looping is enabled (lock-free)
    #[inline]
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::Acquire)
    }

    /// Number of render anomalies so far (lock-free)
    #[inline]
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_pack_roundtrip_extremes() {
        for &(s, e) in &[(0, 1), (10_000, 20_000), (u32::MAX - 1, u32::MAX)] {
            assert_eq!(unpack_bounds(pack_bounds(s, e)), (s, e));
        }
    }

    #[test]
    fn test_seek_is_consumed_once() {
        let atomics = EngineAtomics::new(1000);
        assert_eq!(atomics.take_seek(), None);

        atomics.request_seek(10);
        atomics.request_seek(42);
        assert_eq!(atomics.take_seek(), Some(42));
        assert_eq!(atomics.take_seek(), None);
    }

    #[test]
    fn test_initial_state() {
        let atomics = EngineAtomics::new(48000);
        assert_eq!(atomics.loop_bounds(), (0, 48000));
        assert_eq!(atomics.active_stimulus(), NO_STIMULUS);
        assert_eq!(atomics.requested_stimulus(), NO_STIMULUS);
        assert!(atomics.is_paused());
        assert!(!atomics.is_running());
        assert!(atomics.loop_enabled());
    }
}
