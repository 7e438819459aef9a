//! Playback engine - the real-time render path
//!
//! One `PlaybackEngine` exists per running trial. It is created on the control
//! thread and then moved into the device callback, which is the only caller of
//! [`PlaybackEngine::render_block`]. Everything the control side can change
//! arrives through [`EngineAtomics`] and is sampled once at the start of each
//! block, so a block is always rendered from one consistent set of parameters.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::atomics::EngineAtomics;
use super::control::EngineControl;
use super::events::{event_channel, EngineEvent, EngineEvents, RenderAnomaly};
use super::video::VideoSync;
use crate::config::EngineConfig;
use crate::stimulus::{Stimulus, StimulusSet};
use crate::types::{ChannelBuffer, Sample, NO_STIMULUS};

/// Frame ranges read from a stimulus for one block
#[derive(Debug, Clone, Copy)]
struct BlockRegion {
    /// First frame of the straight copy
    cursor: usize,
    /// Frames copied from `cursor`
    to_copy: usize,
    /// Where the wrap copy restarts
    loop_start: usize,
    /// Frames copied from `loop_start` after the straight copy
    wrap: usize,
}

/// Copy `src[from..]` into `dst`, leaving any shortfall untouched (silent)
#[inline]
fn copy_clamped(dst: &mut [Sample], src: &[Sample], from: usize) {
    if from >= src.len() {
        return;
    }
    let n = dst.len().min(src.len() - from);
    dst[..n].copy_from_slice(&src[from..from + n]);
}

/// Copy one stimulus's frames for `region` into the first `channels` lanes of `dest`
fn copy_region(stimulus: &Stimulus, dest: &mut ChannelBuffer, channels: usize, region: BlockRegion) {
    for ch in 0..channels {
        let src = stimulus.channel(ch);
        let lane = dest.channel_mut(ch);
        copy_clamped(&mut lane[..region.to_copy], src, region.cursor);
        if region.wrap > 0 {
            let wrap_end = region.to_copy + region.wrap;
            copy_clamped(&mut lane[region.to_copy..wrap_end], src, region.loop_start);
        }
    }
}

/// The real-time side of a trial's playback
pub struct PlaybackEngine {
    /// Decoded stimuli (immutable for the engine's lifetime)
    stimuli: Arc<StimulusSet>,
    /// State shared with every `EngineControl`
    atomics: Arc<EngineAtomics>,
    /// Cross-fade on switch (fixed at construction)
    crossfade: bool,
    video_drift_tolerance: u64,
    /// Device sample rate, for cursor <-> seconds
    sample_rate: u32,
    /// Live read position (published after every block)
    cursor: usize,
    /// Live active stimulus (published after every block)
    active: i32,
    /// Pre-allocated buffer for the incoming stimulus during a cross-fade
    scratch: ChannelBuffer,
    events: rtrb::Producer<EngineEvent>,
    video: Option<Box<dyn VideoSync>>,
}

impl PlaybackEngine {
    /// Create an engine for a loaded trial
    ///
    /// Returns the engine (to be moved onto the audio thread), a control handle
    /// and the receiving end of the engine's event ring. The engine starts
    /// paused with no stimulus selected and the loop spanning the whole trial.
    pub fn new(
        stimuli: Arc<StimulusSet>,
        config: &EngineConfig,
        sample_rate: u32,
    ) -> (Self, EngineControl, EngineEvents) {
        let total = u32::try_from(stimuli.frame_count()).unwrap_or(u32::MAX);
        let atomics = Arc::new(EngineAtomics::new(total));
        let control = EngineControl::new(
            Arc::clone(&atomics),
            stimuli.len(),
            total,
            stimuli.channel_count(),
        );
        let (producer, events) = event_channel(config.event_queue_capacity);

        let engine = Self {
            scratch: ChannelBuffer::silence(stimuli.channel_count(), config.max_block_frames),
            stimuli,
            atomics,
            crossfade: config.crossfade,
            video_drift_tolerance: config.video_drift_tolerance_frames,
            sample_rate,
            cursor: 0,
            active: NO_STIMULUS,
            events: producer,
            video: None,
        };

        (engine, control, events)
    }

    /// Attach a video to keep in step with the audio (replaces any previous one)
    pub fn attach_video(&mut self, video: Box<dyn VideoSync>) {
        self.video = Some(video);
    }

    /// Channels per stimulus (the minimum the output buffer must carry)
    pub fn channel_count(&self) -> usize {
        self.stimuli.channel_count()
    }

    /// Largest block `render_block` accepts
    pub fn max_block_frames(&self) -> usize {
        self.scratch.capacity()
    }

    /// Device sample rate this engine was built for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render one block of `frames` frames into `output`
    ///
    /// Always fills the first `frames` frames of every output channel. Never
    /// blocks, allocates or fails: anything inconsistent renders silence and
    /// is reported as an [`EngineEvent::Anomaly`].
    pub fn render_block(&mut self, output: &mut ChannelBuffer, frames: usize) {
        let capacity = output.capacity().min(self.scratch.capacity());
        if frames > capacity {
            output.set_len_from_capacity(output.capacity());
            output.fill_silence();
            self.report(RenderAnomaly::BlockTooLarge { frames, capacity });
            return;
        }
        output.set_len_from_capacity(frames);
        output.fill_silence();

        let channels = self.stimuli.channel_count();
        if output.channels() < channels {
            self.report(RenderAnomaly::MissingOutputChannels {
                required: channels,
                available: output.channels(),
            });
            return;
        }

        if frames == 0 || self.stimuli.frame_count() == 0 {
            return;
        }

        // Parameter intake: one consistent snapshot per block
        let paused = self.atomics.paused.load(Ordering::Acquire);
        let (loop_start, loop_end) = self.loop_region();
        let seek = self.atomics.take_seek();
        let looping = self.atomics.loop_enabled.load(Ordering::Acquire);
        let requested = self.atomics.requested_stimulus.load(Ordering::Acquire);
        // A seek target is clamped into the region; a cursor left outside
        // moved bounds restarts at the region start
        let seeked = match seek {
            Some(frame) => {
                let frame = usize::try_from(frame).unwrap_or(usize::MAX);
                self.cursor = frame.clamp(loop_start, loop_end - 1);
                true
            }
            None => {
                if !(loop_start..loop_end).contains(&self.cursor) {
                    self.cursor = loop_start;
                }
                false
            }
        };

        if paused {
            self.stop_video();
            self.publish();
            return;
        }

        if !self.is_valid_index(requested) {
            self.report(RenderAnomaly::InvalidStimulus { index: requested });
            self.publish();
            return;
        }

        if self.active == NO_STIMULUS && requested == NO_STIMULUS {
            self.publish();
            return;
        }

        self.sync_video(seeked);

        let to_copy = frames.min(loop_end - self.cursor);
        let leftover = frames - to_copy;
        // Wrap copy is capped at one loop span; a loop shorter than the
        // block leaves the rest of the block silent
        let wrap = if looping {
            leftover.min(loop_end - loop_start)
        } else {
            0
        };
        let region = BlockRegion {
            cursor: self.cursor,
            to_copy,
            loop_start,
            wrap,
        };

        if requested == self.active {
            self.render_source(self.active, output, region);
        } else {
            self.render_switch(requested, output, region);
            self.active = requested;
            self.push(EngineEvent::StimulusActivated { index: requested });
        }

        self.advance(frames, loop_start, loop_end, looping);
        self.publish();
    }

    /// Render a block that changes the active stimulus
    fn render_switch(&mut self, requested: i32, output: &mut ChannelBuffer, region: BlockRegion) {
        let channels = self.stimuli.channel_count();

        match (self.active, requested) {
            // Start from idle: plain copy
            (NO_STIMULUS, next) => self.render_source(next, output, region),

            // No fade: the active stimulus finishes this block, the
            // requested one starts on the next
            (current, _) if !self.crossfade => self.render_source(current, output, region),

            // Fade out to silence
            (current, NO_STIMULUS) => {
                self.render_source(current, output, region);
                for ch in 0..channels {
                    output.apply_gain_ramp(ch, 1.0, 0.0);
                }
            }

            // Cross-fade over the whole block
            (current, next) => {
                self.render_source(current, output, region);

                self.scratch.set_len_from_capacity(output.len());
                self.scratch.fill_silence();
                let incoming = usize::try_from(next)
                    .ok()
                    .and_then(|i| self.stimuli.get(i));
                if let Some(stimulus) = incoming {
                    copy_region(stimulus, &mut self.scratch, channels, region);
                }

                for ch in 0..channels {
                    output.apply_gain_ramp(ch, 1.0, 0.0);
                    output.add_from_with_ramp(ch, self.scratch.channel(ch), 0.0, 1.0);
                }
            }
        }
    }

    /// Copy a stimulus's block into `output` (no-op for `NO_STIMULUS`)
    fn render_source(&self, index: i32, output: &mut ChannelBuffer, region: BlockRegion) {
        if let Some(stimulus) = self.stimulus(index) {
            copy_region(stimulus, output, self.stimuli.channel_count(), region);
        }
    }

    /// Move the cursor past a rendered block, wrapping or stopping at loop end
    fn advance(&mut self, frames: usize, loop_start: usize, loop_end: usize, looping: bool) {
        self.cursor += frames;
        if self.cursor < loop_end {
            return;
        }

        if looping {
            let span = loop_end - loop_start;
            self.cursor = loop_start + (self.cursor - loop_end) % span;
        } else {
            self.cursor = loop_start;
            self.atomics.paused.store(true, Ordering::Release);
            self.stop_video();
            self.push(EngineEvent::LoopEndReached {
                cursor: loop_start as u64,
            });
        }
    }

    /// Loop bounds clamped into `[0, N]`; a degenerate pair falls back to the whole trial
    fn loop_region(&self) -> (usize, usize) {
        let total = self.stimuli.frame_count();
        let (start, end) = self.atomics.loop_bounds();
        let start = start as usize;
        let end = (end as usize).min(total);
        if start < end {
            (start, end)
        } else {
            (0, total)
        }
    }

    fn is_valid_index(&self, index: i32) -> bool {
        index == NO_STIMULUS || (index >= 0 && (index as usize) < self.stimuli.len())
    }

    fn stimulus(&self, index: i32) -> Option<&Stimulus> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.stimuli.get(i))
    }

    /// Nudge the video back to the audio cursor if it has drifted
    fn sync_video(&mut self, force: bool) {
        if self.sample_rate == 0 {
            return;
        }
        let Some(video) = self.video.as_deref_mut() else {
            return;
        };
        if !video.is_open() {
            return;
        }

        let rate = self.sample_rate as f64;
        let video_frame = (video.position().max(0.0) * rate) as u64;
        let drift = video_frame.abs_diff(self.cursor as u64);

        let mut resynced = None;
        if force || drift > self.video_drift_tolerance {
            video.set_position(self.cursor as f64 / rate);
            resynced = Some(drift);
        }
        if !video.is_playing() {
            video.play();
        }

        if let Some(drift_frames) = resynced {
            self.push(EngineEvent::VideoResynced { drift_frames });
        }
    }

    fn stop_video(&mut self) {
        if let Some(video) = self.video.as_deref_mut() {
            if video.is_playing() {
                video.stop();
            }
        }
    }

    /// Publish render-thread state for UI polling
    #[inline]
    fn publish(&self) {
        self.atomics
            .cursor
            .store(self.cursor as u64, Ordering::Relaxed);
        self.atomics
            .active_stimulus
            .store(self.active, Ordering::Relaxed);
    }

    fn report(&mut self, anomaly: RenderAnomaly) {
        self.atomics.anomalies.fetch_add(1, Ordering::Relaxed);
        self.push(EngineEvent::Anomaly(anomaly));
    }

    /// Queue an event; dropped if the control side is not keeping up
    #[inline]
    fn push(&mut self, event: EngineEvent) {
        let _ = self.events.push(event);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        // Device stop tears down the engine; the video must not keep running
        self.stop_video();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::MAX_BLOCK_FRAMES;

    /// Distinct, exactly reproducible value per (stimulus, channel, frame)
    fn sample(index: usize, ch: usize, frame: usize) -> Sample {
        let v = (index + 1) as Sample * 0.1 + frame as Sample * 1e-5;
        if ch == 0 {
            v
        } else {
            -v
        }
    }

    fn make_set(count: usize, channels: usize, frames: usize) -> Arc<StimulusSet> {
        let stimuli = (0..count)
            .map(|i| {
                let data = (0..channels)
                    .map(|ch| (0..frames).map(|f| sample(i, ch, f)).collect())
                    .collect();
                Stimulus::new(format!("stim{i}.wav"), 48000, data)
            })
            .collect();
        Arc::new(StimulusSet::new(stimuli).unwrap())
    }

    fn make_engine(
        count: usize,
        channels: usize,
        frames: usize,
        config: &EngineConfig,
    ) -> (PlaybackEngine, EngineControl, EngineEvents, ChannelBuffer) {
        let (engine, control, events) =
            PlaybackEngine::new(make_set(count, channels, frames), config, 48000);
        let output = ChannelBuffer::silence(channels, MAX_BLOCK_FRAMES);
        (engine, control, events, output)
    }

    fn is_silent(buffer: &ChannelBuffer) -> bool {
        buffer.peak() == 0.0
    }

    #[test]
    fn test_new_engine_is_paused_and_silent() {
        let (mut engine, control, _events, mut out) = make_engine(2, 2, 1000, &EngineConfig::default());

        assert!(control.is_paused());
        assert_eq!(control.current_stimulus(), NO_STIMULUS);
        assert_eq!(control.loop_bounds(), (0, 1000));

        control.select_stimulus(0).unwrap();
        engine.render_block(&mut out, 64);
        assert_eq!(out.len(), 64);
        assert!(is_silent(&out));
        assert_eq!(control.cursor_position(), 0);
    }

    #[test]
    fn test_nothing_selected_does_not_advance() {
        let (mut engine, control, _events, mut out) = make_engine(2, 2, 1000, &EngineConfig::default());
        control.resume();

        engine.render_block(&mut out, 64);
        engine.render_block(&mut out, 64);
        assert!(is_silent(&out));
        assert_eq!(control.cursor_position(), 0);
    }

    #[test]
    fn test_loop_output_is_periodic() {
        let (mut engine, control, _events, mut out) = make_engine(1, 2, 2000, &EngineConfig::default());
        control.set_loop_bounds(500, 1300).unwrap();
        control.select_stimulus(0).unwrap();
        control.resume();

        let block = 128;
        let mut t = 0;
        for _ in 0..50 {
            engine.render_block(&mut out, block);
            for i in 0..block {
                let frame = 500 + (t + i) % 800;
                assert_eq!(out.channel(0)[i], sample(0, 0, frame), "t={}", t + i);
                assert_eq!(out.channel(1)[i], sample(0, 1, frame), "t={}", t + i);
            }
            t += block;
        }
        assert_eq!(control.cursor_position(), (500 + t % 800) as u64);
    }

    #[test]
    fn test_seek_then_render_starts_at_target() {
        let (mut engine, control, _events, mut out) = make_engine(1, 2, 1000, &EngineConfig::default());
        control.select_stimulus(0).unwrap();
        control.resume();

        for &target in &[0u64, 123, 999] {
            control.seek(target).unwrap();
            engine.render_block(&mut out, 64);
            assert_eq!(out.channel(0)[0], sample(0, 0, target as usize));
        }

        // Wrap: 999 is the last frame, so the next frame is the loop start
        assert_eq!(out.channel(0)[1], sample(0, 0, 0));
    }

    #[test]
    fn test_seek_is_clamped_to_loop() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::default());
        control.set_loop_bounds(100, 400).unwrap();
        control.select_stimulus(0).unwrap();
        control.resume();

        control.seek(50).unwrap();
        engine.render_block(&mut out, 16);
        assert_eq!(out.channel(0)[0], sample(0, 0, 100));

        control.seek(900).unwrap();
        engine.render_block(&mut out, 16);
        assert_eq!(out.channel(0)[0], sample(0, 0, 399));
        assert_eq!(out.channel(0)[1], sample(0, 0, 100));
    }

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let (mut engine, control, _events, mut out) = make_engine(1, 2, 1000, &EngineConfig::default());
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 64);

        control.pause();
        control.pause();
        engine.render_block(&mut out, 64);
        assert!(is_silent(&out));
        assert_eq!(control.cursor_position(), 64);

        control.resume();
        control.resume();
        engine.render_block(&mut out, 64);
        assert_eq!(out.channel(0)[0], sample(0, 0, 64));
        assert_eq!(control.cursor_position(), 128);
    }

    #[test]
    fn test_non_looping_end_pauses_at_loop_start() {
        let (mut engine, control, mut events, mut out) = make_engine(1, 2, 1000, &EngineConfig::default());
        control.set_loop_enabled(false);
        control.set_loop_bounds(200, 600).unwrap();
        control.select_stimulus(0).unwrap();
        control.resume();
        control.seek(500).unwrap();

        engine.render_block(&mut out, 256);
        for i in 0..100 {
            assert_eq!(out.channel(0)[i], sample(0, 0, 500 + i));
        }
        assert!(out.channel(0)[100..].iter().all(|&s| s == 0.0));
        assert!(control.is_paused());
        assert_eq!(control.cursor_position(), 200);
        assert!(events
            .drain()
            .any(|e| e == EngineEvent::LoopEndReached { cursor: 200 }));

        engine.render_block(&mut out, 256);
        assert!(is_silent(&out));
        assert_eq!(control.cursor_position(), 200);
    }

    #[test]
    fn test_crossfade_is_one_linear_block() {
        let (mut engine, control, mut events, mut out) = make_engine(2, 2, 1000, &EngineConfig::default());
        let f = 64;
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, f);

        control.select_stimulus(1).unwrap();
        engine.render_block(&mut out, f);
        for ch in 0..2 {
            for i in 0..f {
                let t = i as Sample / f as Sample;
                let expected = sample(0, ch, f + i) * (1.0 - t) + sample(1, ch, f + i) * t;
                assert!(
                    (out.channel(ch)[i] - expected).abs() < 1e-6,
                    "ch={} i={}: {} vs {}",
                    ch,
                    i,
                    out.channel(ch)[i],
                    expected
                );
            }
        }
        assert_eq!(control.current_stimulus(), 1);

        // The following block is stimulus 1 untouched
        engine.render_block(&mut out, f);
        for i in 0..f {
            assert_eq!(out.channel(0)[i], sample(1, 0, 2 * f + i));
        }

        let activations: Vec<_> = events
            .drain()
            .filter(|e| matches!(e, EngineEvent::StimulusActivated { .. }))
            .collect();
        assert_eq!(
            activations,
            vec![
                EngineEvent::StimulusActivated { index: 0 },
                EngineEvent::StimulusActivated { index: 1 },
            ]
        );
    }

    #[test]
    fn test_switch_without_crossfade_waits_one_block() {
        let (mut engine, control, _events, mut out) = make_engine(2, 1, 1000, &EngineConfig::without_crossfade());
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 32);

        control.select_stimulus(1).unwrap();
        engine.render_block(&mut out, 32);
        for i in 0..32 {
            assert_eq!(out.channel(0)[i], sample(0, 0, 32 + i));
        }
        assert_eq!(control.current_stimulus(), 1);

        engine.render_block(&mut out, 32);
        for i in 0..32 {
            assert_eq!(out.channel(0)[i], sample(1, 0, 64 + i));
        }
    }

    #[test]
    fn test_deselect_fades_out_then_idles() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::default());
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 32);

        control.select_stimulus(NO_STIMULUS).unwrap();
        engine.render_block(&mut out, 32);
        for i in 0..32 {
            let expected = sample(0, 0, 32 + i) * (1.0 - i as Sample / 32.0);
            assert!((out.channel(0)[i] - expected).abs() < 1e-6);
        }
        assert_eq!(control.current_stimulus(), NO_STIMULUS);
        assert_eq!(control.cursor_position(), 64);

        engine.render_block(&mut out, 32);
        assert!(is_silent(&out));
        assert_eq!(control.cursor_position(), 64);
    }

    #[test]
    fn test_deselect_without_crossfade_finishes_block() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::without_crossfade());
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 32);

        control.select_stimulus(NO_STIMULUS).unwrap();
        engine.render_block(&mut out, 32);
        for i in 0..32 {
            assert_eq!(out.channel(0)[i], sample(0, 0, 32 + i));
        }
        assert_eq!(control.current_stimulus(), NO_STIMULUS);

        engine.render_block(&mut out, 32);
        assert!(is_silent(&out));
    }

    #[test]
    fn test_reselecting_active_stimulus_cancels_switch() {
        let (mut engine, control, _events, mut out) = make_engine(2, 1, 1000, &EngineConfig::default());
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 32);

        control.select_stimulus(1).unwrap();
        control.select_stimulus(0).unwrap();
        engine.render_block(&mut out, 32);
        for i in 0..32 {
            assert_eq!(out.channel(0)[i], sample(0, 0, 32 + i));
        }
        assert_eq!(control.current_stimulus(), 0);
    }

    #[test]
    fn test_full_pass_returns_cursor_to_zero() {
        let (mut engine, control, _events, mut out) = make_engine(2, 2, 48000, &EngineConfig::default());
        control.set_loop_bounds(0, 48000).unwrap();
        control.set_loop_enabled(true);
        control.select_stimulus(0).unwrap();
        control.resume();

        for _ in 0..1000 {
            engine.render_block(&mut out, 48);
        }
        assert_eq!(control.cursor_position(), 0);
    }

    #[test]
    fn test_cursor_outside_new_bounds_restarts_at_start() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 48000, &EngineConfig::default());
        control.select_stimulus(0).unwrap();
        control.resume();
        control.seek(15000).unwrap();
        engine.render_block(&mut out, 64);
        assert_eq!(control.cursor_position(), 15064);

        // Inside the new region: untouched
        control.set_loop_bounds(10000, 20000).unwrap();
        assert_eq!(control.cursor_position(), 15064);
        engine.render_block(&mut out, 64);
        assert_eq!(out.channel(0)[0], sample(0, 0, 15064));

        // Outside: nothing moves until the next block, which restarts at the region start
        control.set_loop_bounds(1000, 2000).unwrap();
        assert_eq!(control.cursor_position(), 15128);
        engine.render_block(&mut out, 64);
        for i in 0..64 {
            assert_eq!(out.channel(0)[i], sample(0, 0, 1000 + i));
        }
        assert_eq!(control.cursor_position(), 1064);
    }

    #[test]
    fn test_loop_shorter_than_block_leaves_gap() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::default());
        control.set_loop_bounds(100, 120).unwrap();
        control.select_stimulus(0).unwrap();
        control.resume();

        engine.render_block(&mut out, 64);
        let lane = out.channel(0);
        for i in 0..20 {
            assert_eq!(lane[i], sample(0, 0, 100 + i));
            assert_eq!(lane[20 + i], sample(0, 0, 100 + i));
        }
        assert!(lane[40..].iter().all(|&s| s == 0.0));
        assert_eq!(control.cursor_position(), 104);

        engine.render_block(&mut out, 64);
        let lane = out.channel(0);
        for i in 0..16 {
            assert_eq!(lane[i], sample(0, 0, 104 + i));
        }
        for i in 0..20 {
            assert_eq!(lane[16 + i], sample(0, 0, 100 + i));
        }
        assert!(lane[36..].iter().all(|&s| s == 0.0));
        assert_eq!(control.cursor_position(), 108);
    }

    #[test]
    fn test_oversized_block_renders_silence() {
        let config = EngineConfig::default().with_max_block_frames(256);
        let (mut engine, control, mut events, mut out) = make_engine(1, 1, 1000, &config);
        control.select_stimulus(0).unwrap();
        control.resume();

        engine.render_block(&mut out, 512);
        assert!(is_silent(&out));
        assert_eq!(control.anomaly_count(), 1);
        assert_eq!(control.cursor_position(), 0);
        assert_eq!(
            events.try_recv(),
            Some(EngineEvent::Anomaly(RenderAnomaly::BlockTooLarge {
                frames: 512,
                capacity: 256
            }))
        );

        // Normal blocks still work afterwards
        engine.render_block(&mut out, 256);
        assert_eq!(out.channel(0)[10], sample(0, 0, 10));
    }

    #[test]
    fn test_missing_output_channels_renders_silence() {
        let (mut engine, control, _events, _) = make_engine(1, 2, 1000, &EngineConfig::default());
        let mut mono = ChannelBuffer::silence(1, 256);
        control.select_stimulus(0).unwrap();
        control.resume();

        engine.render_block(&mut mono, 128);
        assert!(is_silent(&mono));
        assert_eq!(control.anomaly_count(), 1);
    }

    #[test]
    fn test_extra_output_channels_are_silent() {
        let (mut engine, control, _events, _) = make_engine(1, 2, 1000, &EngineConfig::default());
        let mut quad = ChannelBuffer::silence(4, 256);
        control.select_stimulus(0).unwrap();
        control.resume();

        engine.render_block(&mut quad, 128);
        assert_eq!(quad.channel(1)[5], sample(0, 1, 5));
        assert!(quad.channel(2).iter().all(|&s| s == 0.0));
        assert!(quad.channel(3).iter().all(|&s| s == 0.0));
    }

    #[derive(Default)]
    struct VideoState {
        open: bool,
        playing: bool,
        position: f64,
        seeks: Vec<f64>,
    }

    struct FakeVideo(Arc<Mutex<VideoState>>);

    impl VideoSync for FakeVideo {
        fn is_open(&self) -> bool {
            self.0.lock().unwrap().open
        }
        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().playing
        }
        fn position(&self) -> f64 {
            self.0.lock().unwrap().position
        }
        fn set_position(&mut self, seconds: f64) {
            let mut state = self.0.lock().unwrap();
            state.position = seconds;
            state.seeks.push(seconds);
        }
        fn play(&mut self) {
            self.0.lock().unwrap().playing = true;
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().playing = false;
        }
    }

    fn attach_fake_video(engine: &mut PlaybackEngine) -> Arc<Mutex<VideoState>> {
        let state = Arc::new(Mutex::new(VideoState {
            open: true,
            ..Default::default()
        }));
        engine.attach_video(Box::new(FakeVideo(Arc::clone(&state))));
        state
    }

    #[test]
    fn test_video_follows_transport() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 48000, &EngineConfig::default());
        let video = attach_fake_video(&mut engine);
        control.select_stimulus(0).unwrap();
        control.resume();

        engine.render_block(&mut out, 64);
        assert!(video.lock().unwrap().playing);
        assert!(video.lock().unwrap().seeks.is_empty());

        // A seek always re-positions the video
        control.seek(24000).unwrap();
        engine.render_block(&mut out, 64);
        assert_eq!(video.lock().unwrap().seeks, vec![0.5]);

        // Small drift is tolerated, large drift is corrected
        video.lock().unwrap().position = 24100.0 / 48000.0;
        engine.render_block(&mut out, 64);
        assert_eq!(video.lock().unwrap().seeks.len(), 1);

        video.lock().unwrap().position = 0.0;
        engine.render_block(&mut out, 64);
        assert_eq!(video.lock().unwrap().seeks.last(), Some(&(24128.0 / 48000.0)));

        control.pause();
        engine.render_block(&mut out, 64);
        assert!(!video.lock().unwrap().playing);
    }

    #[test]
    fn test_video_stops_at_non_looping_end() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::default());
        let video = attach_fake_video(&mut engine);
        control.set_loop_enabled(false);
        control.select_stimulus(0).unwrap();
        control.resume();
        control.seek(900).unwrap();

        engine.render_block(&mut out, 256);
        assert!(control.is_paused());
        assert!(!video.lock().unwrap().playing);
    }

    #[test]
    fn test_dropping_engine_stops_video() {
        let (mut engine, control, _events, mut out) = make_engine(1, 1, 1000, &EngineConfig::default());
        let video = attach_fake_video(&mut engine);
        control.select_stimulus(0).unwrap();
        control.resume();
        engine.render_block(&mut out, 64);
        assert!(video.lock().unwrap().playing);

        drop(engine);
        assert!(!video.lock().unwrap().playing);
    }
}
