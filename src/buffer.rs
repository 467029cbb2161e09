//! Multi-channel sample storage and the region view handed to sources.

/// Planar multi-channel `f32` sample storage.
///
/// `SampleBuffer` is the fundamental unit of audio data passed through the
/// transport. Each channel occupies one contiguous run of memory, so
/// per-channel copies and gain ramps never stride across other channels.
///
/// The buffer is sized once, outside the audio callback; none of the
/// sample-level methods allocate.
///
/// # Example
///
/// ```
/// use stream_transport::SampleBuffer;
///
/// let mut buffer = SampleBuffer::new(2, 512);
/// buffer.channel_mut(0).fill(0.5);
/// buffer.apply_gain_ramp(0, 0, 512, 1.0, 0.0);
/// assert_eq!(buffer.channel(0)[0], 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
    /// Allocated frames per channel; `frames <= stride`.
    stride: usize,
}

impl SampleBuffer {
    /// Creates a zeroed buffer with the given shape.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
            stride: frames,
        }
    }

    /// Creates a buffer from one `Vec` per channel.
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), frames);
        for (ch, samples) in channels.iter().enumerate() {
            buffer.channel_mut(ch)[..samples.len()].copy_from_slice(samples);
        }
        buffer
    }

    /// Returns the number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Returns the number of frames per channel.
    pub fn num_frames(&self) -> usize {
        self.frames
    }

    /// Returns `true` if the buffer holds no frames or no channels.
    pub fn is_empty(&self) -> bool {
        self.channels == 0 || self.frames == 0
    }

    /// Changes the shape of the buffer, clearing its contents.
    ///
    /// Reallocates only when the new shape does not fit the existing
    /// allocation, so shrinking and regrowing within the original size is
    /// allocation-free.
    pub fn set_size(&mut self, channels: usize, frames: usize) {
        if channels * frames > self.data.len() {
            self.data = vec![0.0; channels * frames];
        }
        self.stride = if channels == 0 {
            frames
        } else {
            self.data.len() / channels
        };
        self.channels = channels;
        self.frames = frames;
        self.clear();
    }

    /// Returns the samples of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_channels()`.
    pub fn channel(&self, ch: usize) -> &[f32] {
        assert!(ch < self.channels, "channel {ch} out of range");
        let offset = ch * self.stride;
        &self.data[offset..offset + self.frames]
    }

    /// Returns the samples of one channel for writing.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_channels()`.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        assert!(ch < self.channels, "channel {ch} out of range");
        let offset = ch * self.stride;
        &mut self.data[offset..offset + self.frames]
    }

    /// Zeroes every sample.
    pub fn clear(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Zeroes `len` frames starting at `start` in every channel.
    pub fn clear_range(&mut self, start: usize, len: usize) {
        for ch in 0..self.channels {
            self.channel_mut(ch)[start..start + len].fill(0.0);
        }
    }

    /// Multiplies a range of one channel by a constant gain.
    pub fn apply_gain(&mut self, ch: usize, start: usize, len: usize, gain: f32) {
        if (gain - 1.0).abs() <= f32::EPSILON {
            return;
        }
        for sample in &mut self.channel_mut(ch)[start..start + len] {
            *sample *= gain;
        }
    }

    /// Multiplies a range of one channel by a gain that moves linearly from
    /// `start_gain` to `end_gain`.
    ///
    /// The first sample is scaled by `start_gain`; the ramp reaches
    /// `end_gain` one sample past the end of the range, so consecutive
    /// ramps join without a repeated value.
    pub fn apply_gain_ramp(
        &mut self,
        ch: usize,
        start: usize,
        len: usize,
        start_gain: f32,
        end_gain: f32,
    ) {
        if len == 0 {
            return;
        }
        if (start_gain - end_gain).abs() <= f32::EPSILON {
            self.apply_gain(ch, start, len, start_gain);
            return;
        }
        let increment = (end_gain - start_gain) / len as f32;
        let mut gain = start_gain;
        for sample in &mut self.channel_mut(ch)[start..start + len] {
            *sample *= gain;
            gain += increment;
        }
    }

    /// Copies `len` frames of channel `src_ch` of `src` into this buffer.
    pub fn copy_from(
        &mut self,
        dest_ch: usize,
        dest_start: usize,
        src: &SampleBuffer,
        src_ch: usize,
        src_start: usize,
        len: usize,
    ) {
        self.channel_mut(dest_ch)[dest_start..dest_start + len]
            .copy_from_slice(&src.channel(src_ch)[src_start..src_start + len]);
    }
}

impl PartialEq for SampleBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels
            && self.frames == other.frames
            && (0..self.channels).all(|ch| self.channel(ch) == other.channel(ch))
    }
}

/// A region of a [`SampleBuffer`] that a source must fill.
///
/// This is what the audio callback hands down the source chain: a borrowed
/// buffer plus the frame range that belongs to this call. Sources write
/// only inside `start..start + len`.
#[derive(Debug)]
pub struct BlockRegion<'a> {
    /// The buffer being filled.
    pub buffer: &'a mut SampleBuffer,
    /// First frame of the region.
    pub start: usize,
    /// Number of frames in the region.
    pub len: usize,
}

impl<'a> BlockRegion<'a> {
    /// Creates a region covering `len` frames from `start`.
    ///
    /// # Panics
    ///
    /// Panics if the region extends past the end of the buffer.
    pub fn new(buffer: &'a mut SampleBuffer, start: usize, len: usize) -> Self {
        assert!(
            start + len <= buffer.num_frames(),
            "region {start}+{len} exceeds buffer of {} frames",
            buffer.num_frames()
        );
        Self { buffer, start, len }
    }

    /// Creates a region covering the whole buffer.
    pub fn whole(buffer: &'a mut SampleBuffer) -> Self {
        let len = buffer.num_frames();
        Self {
            buffer,
            start: 0,
            len,
        }
    }

    /// Returns the number of channels in the underlying buffer.
    pub fn num_channels(&self) -> usize {
        self.buffer.num_channels()
    }

    /// Returns the region's part of one channel.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let (start, len) = (self.start, self.len);
        &mut self.buffer.channel_mut(ch)[start..start + len]
    }

    /// Zeroes the region in every channel.
    pub fn clear(&mut self) {
        self.buffer.clear_range(self.start, self.len);
    }

    /// Reborrows a sub-range of this region, relative to its start.
    pub fn sub_region(&mut self, offset: usize, len: usize) -> BlockRegion<'_> {
        debug_assert!(offset + len <= self.len);
        BlockRegion {
            buffer: self.buffer,
            start: self.start + offset,
            len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = SampleBuffer::new(2, 64);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_frames(), 64);
        assert!(buffer.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_from_channels_pads_short_channels() {
        let buffer = SampleBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.channel(1), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_size_shrink_and_regrow_keeps_allocation() {
        let mut buffer = SampleBuffer::new(2, 100);
        buffer.set_size(2, 10);
        assert_eq!(buffer.num_frames(), 10);
        buffer.channel_mut(1).fill(1.0);
        buffer.set_size(2, 100);
        assert_eq!(buffer.num_frames(), 100);
        assert!(buffer.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_size_grow() {
        let mut buffer = SampleBuffer::new(1, 4);
        buffer.set_size(3, 16);
        assert_eq!(buffer.num_channels(), 3);
        assert_eq!(buffer.channel(2).len(), 16);
    }

    #[test]
    fn test_gain_ramp_is_linear() {
        let mut buffer = SampleBuffer::new(1, 4);
        buffer.channel_mut(0).fill(1.0);
        buffer.apply_gain_ramp(0, 0, 4, 1.0, 0.0);
        assert_eq!(buffer.channel(0), &[1.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_clear_range() {
        let mut buffer = SampleBuffer::from_channels(vec![vec![1.0; 4], vec![2.0; 4]]);
        buffer.clear_range(1, 2);
        assert_eq!(buffer.channel(0), &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(buffer.channel(1), &[2.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_region_only_touches_its_range() {
        let mut buffer = SampleBuffer::from_channels(vec![vec![1.0; 8]]);
        let mut region = BlockRegion::new(&mut buffer, 2, 4);
        region.clear();
        region.sub_region(1, 1).channel_mut(0)[0] = 5.0;
        assert_eq!(buffer.channel(0), &[1.0, 1.0, 0.0, 5.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer")]
    fn test_region_out_of_bounds() {
        let mut buffer = SampleBuffer::new(1, 4);
        let _ = BlockRegion::new(&mut buffer, 2, 4);
    }
}
