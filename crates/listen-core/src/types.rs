//! Common types for the playback core
//!
//! The render path works on channel-separated (non-interleaved) audio, which is
//! what both the stimulus store keeps in memory and what JACK hands out per port.

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Stimulus index meaning "nothing selected - render silence"
pub const NO_STIMULUS: i32 = -1;

/// Default maximum block size to pre-allocate for real-time safety
/// Covers all common device configurations (64 .. 4096 frames)
pub const MAX_BLOCK_FRAMES: usize = 8192;

/// A pre-allocated, channel-separated audio buffer
///
/// Storage is a single allocation with one fixed-size lane per channel, so
/// changing the working length never allocates. This is the buffer type the
/// engine renders into and the device backends copy out of.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    data: Vec<Sample>,
    channels: usize,
    capacity: usize,
    len: usize,
}

impl ChannelBuffer {
    /// Create a buffer of `channels` lanes, each `frames` long, filled with silence
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            capacity: frames,
            len: frames,
        }
    }

    /// Create a buffer from per-channel sample vectors (all must share a length)
    pub fn from_channels(channels: &[Vec<Sample>]) -> Self {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        assert!(
            channels.iter().all(|c| c.len() == frames),
            "Channel lengths must match"
        );
        let mut buffer = Self::silence(channels.len(), frames);
        for (ch, samples) in channels.iter().enumerate() {
            buffer.channel_mut(ch).copy_from_slice(samples);
        }
        buffer
    }

    /// Number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Working length in frames
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the working length is zero
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum working length in frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the working length of the pre-allocated buffer (real-time safe)
    ///
    /// The length is capped at capacity; nothing is ever reallocated.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.capacity,
            "set_len_from_capacity called with len > capacity"
        );
        self.len = new_len.min(self.capacity);
    }

    /// Fill the working region of every channel with silence
    pub fn fill_silence(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Working region of one channel
    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        let start = ch * self.capacity;
        &self.data[start..start + self.len]
    }

    /// Mutable working region of one channel
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        let start = ch * self.capacity;
        &mut self.data[start..start + self.len]
    }

    /// Multiply one channel by a linear gain ramp
    ///
    /// Frame `i` of an `n`-frame region is scaled by
    /// `start_gain + (end_gain - start_gain) * i / n`, so the end gain itself is
    /// reached on the frame after the region.
    pub fn apply_gain_ramp(&mut self, ch: usize, start_gain: Sample, end_gain: Sample) {
        let samples = self.channel_mut(ch);
        let n = samples.len();
        if n == 0 {
            return;
        }
        let step = (end_gain - start_gain) / n as Sample;
        for (i, s) in samples.iter_mut().enumerate() {
            *s *= start_gain + step * i as Sample;
        }
    }

    /// Add `source` into one channel through a linear gain ramp
    ///
    /// Uses the same ramp shape as [`ChannelBuffer::apply_gain_ramp`].
    pub fn add_from_with_ramp(
        &mut self,
        ch: usize,
        source: &[Sample],
        start_gain: Sample,
        end_gain: Sample,
    ) {
        let samples = self.channel_mut(ch);
        let n = samples.len().min(source.len());
        if n == 0 {
            return;
        }
        let step = (end_gain - start_gain) / samples.len() as Sample;
        for (i, (dst, src)) in samples.iter_mut().zip(&source[..n]).enumerate() {
            *dst += *src * (start_gain + step * i as Sample);
        }
    }

    /// Write the working region to an interleaved device buffer
    ///
    /// Channel `c` goes to device channel `c`. Device channels beyond this
    /// buffer's channel count, and frames beyond the working length, are zeroed.
    pub fn write_interleaved(&self, output: &mut [Sample], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        for (i, frame) in output.chunks_mut(device_channels).enumerate() {
            for (ch, slot) in frame.iter_mut().enumerate() {
                *slot = if i < self.len && ch < self.channels {
                    self.data[ch * self.capacity + i]
                } else {
                    0.0
                };
            }
        }
    }

    /// Get the peak amplitude across the working region of all channels
    pub fn peak(&self) -> Sample {
        (0..self.channels)
            .flat_map(|ch| self.channel(ch).iter())
            .fold(0.0, |acc: Sample, s| acc.max(s.abs()))
    }
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self::silence(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_len_keeps_capacity() {
        let mut buffer = ChannelBuffer::silence(2, 64);
        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.channel(1).len(), 16);

        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.channel(0).len(), 64);
    }

    #[test]
    fn test_channels_do_not_overlap() {
        let mut buffer = ChannelBuffer::silence(2, 8);
        buffer.set_len_from_capacity(4);
        buffer.channel_mut(0).fill(1.0);
        buffer.channel_mut(1).fill(-1.0);

        assert!(buffer.channel(0).iter().all(|&s| s == 1.0));
        assert!(buffer.channel(1).iter().all(|&s| s == -1.0));
    }

    #[test]
    fn test_gain_ramp_shape() {
        let mut buffer = ChannelBuffer::from_channels(&[vec![1.0; 4]]);
        buffer.apply_gain_ramp(0, 1.0, 0.0);
        assert_eq!(buffer.channel(0), &[1.0, 0.75, 0.5, 0.25]);

        buffer.add_from_with_ramp(0, &[1.0; 4], 0.0, 1.0);
        for &s in buffer.channel(0) {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_write_interleaved_pads_extra_device_channels() {
        let buffer = ChannelBuffer::from_channels(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut output = [9.0; 6];
        buffer.write_interleaved(&mut output, 3);
        assert_eq!(output, [1.0, 3.0, 0.0, 2.0, 4.0, 0.0]);
    }

    #[test]
    fn test_peak() {
        let buffer = ChannelBuffer::from_channels(&[vec![0.25, -0.5], vec![0.1, 0.0]]);
        assert_eq!(buffer.peak(), 0.5);
    }
}
