//! Circular multi-channel sample buffer.

use crate::SampleBuffer;

/// A ring of multi-channel samples addressed by a monotonically increasing
/// frame index.
///
/// Writers append with [`push`](Self::push); readers copy any window of the
/// most recent `capacity` frames with [`read`](Self::read), addressed by
/// absolute frame index rather than by a read cursor. The buffer never
/// tracks readers, so the same history can be read any number of times
/// (e.g. for overlapping analysis windows or read-ahead playback).
///
/// Samples are stored per channel, so each push or read is at most two
/// contiguous copies per channel.
///
/// Reading frames older than `write_index() - capacity()` returns whatever
/// has overwritten them. Staying inside the valid window is the caller's
/// responsibility; debug builds assert on it.
///
/// # Example
///
/// ```
/// use stream_transport::{CircularAudioBuffer, SampleBuffer};
///
/// let mut ring = CircularAudioBuffer::new(1, 8);
/// ring.push(&SampleBuffer::from_channels(vec![vec![1.0, 2.0, 3.0]]));
///
/// let mut out = SampleBuffer::new(1, 2);
/// ring.read_block(1, &mut out);
/// assert_eq!(out.channel(0), &[2.0, 3.0]);
/// ```
#[derive(Debug, Clone)]
pub struct CircularAudioBuffer {
    storage: SampleBuffer,
    write_index: i64,
}

impl CircularAudioBuffer {
    /// Creates a silent ring with the given channel count and frame capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(channels: usize, capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            storage: SampleBuffer::new(channels, capacity),
            write_index: 0,
        }
    }

    /// Returns the number of frames the ring holds.
    pub fn capacity(&self) -> usize {
        self.storage.num_frames()
    }

    /// Returns the channel count.
    pub fn num_channels(&self) -> usize {
        self.storage.num_channels()
    }

    /// Returns the total number of frames ever pushed.
    pub fn write_index(&self) -> i64 {
        self.write_index
    }

    /// Returns the oldest frame index that has not been overwritten.
    pub fn oldest_valid_index(&self) -> i64 {
        (self.write_index - self.capacity() as i64).max(0)
    }

    /// Appends all frames of `block`.
    pub fn push(&mut self, block: &SampleBuffer) {
        self.push_region(block, 0, block.num_frames());
    }

    /// Appends `len` frames of `src` starting at frame `start`.
    ///
    /// If `len` exceeds the capacity only the most recent `capacity` frames
    /// are kept, and the write index advances by that truncated amount.
    /// Channels beyond the smaller of the two channel counts are ignored.
    pub fn push_region(&mut self, src: &SampleBuffer, start: usize, len: usize) {
        let capacity = self.capacity();
        let channels = self.num_channels().min(src.num_channels());
        let kept = len.min(capacity);
        let src_start = start + len - kept;

        let mut remaining = kept;
        while remaining > 0 {
            let write_offset = self.write_index.rem_euclid(capacity as i64) as usize;
            let n = remaining.min(capacity - write_offset);
            let src_offset = src_start + kept - remaining;

            for ch in 0..channels {
                self.storage
                    .copy_from(ch, write_offset, src, ch, src_offset, n);
            }

            remaining -= n;
            self.write_index += n as i64;
        }
    }

    /// Copies frames `read_index..read_index + len` into `output` starting at
    /// frame `start`.
    ///
    /// Only the first `min(num_channels(), output.num_channels())` channels
    /// are written; extra output channels are left untouched.
    pub fn read(&self, read_index: i64, output: &mut SampleBuffer, start: usize, len: usize) {
        debug_assert!(
            read_index >= self.oldest_valid_index() && read_index + len as i64 <= self.write_index,
            "read of {read_index}+{len} outside valid history {}..{}",
            self.oldest_valid_index(),
            self.write_index
        );

        let capacity = self.capacity();
        let channels = self.num_channels().min(output.num_channels());

        let mut offset = 0;
        while offset < len {
            let input_offset = (read_index + offset as i64).rem_euclid(capacity as i64) as usize;
            let n = (len - offset).min(capacity - input_offset);

            for ch in 0..channels {
                output.copy_from(ch, start + offset, &self.storage, ch, input_offset, n);
            }

            offset += n;
        }
    }

    /// Fills the whole of `output` with frames from `read_index` onwards.
    pub fn read_block(&self, read_index: i64, output: &mut SampleBuffer) {
        let len = output.num_frames();
        self.read(read_index, output, 0, len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(channels: usize, from: usize, len: usize) -> SampleBuffer {
        SampleBuffer::from_channels(
            (0..channels)
                .map(|ch| {
                    (from..from + len)
                        .map(|i| (i + ch * 10_000) as f32)
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn test_read_after_push() {
        let mut ring = CircularAudioBuffer::new(2, 64);
        ring.push(&ramp(2, 0, 40));
        assert_eq!(ring.write_index(), 40);

        let mut out = SampleBuffer::new(2, 40);
        ring.read_block(0, &mut out);
        assert_eq!(out, ramp(2, 0, 40));
    }

    #[test]
    fn test_read_across_wraparound() {
        let mut ring = CircularAudioBuffer::new(1, 64);
        ring.push(&ramp(1, 0, 32));
        ring.push(&ramp(1, 32, 42));
        assert_eq!(ring.write_index(), 74);

        let mut out = SampleBuffer::new(1, 32);
        ring.read_block(42, &mut out);
        assert_eq!(out, ramp(1, 42, 32));
    }

    #[test]
    fn test_oversized_push_keeps_tail() {
        let mut ring = CircularAudioBuffer::new(1, 16);
        ring.push(&ramp(1, 0, 50));
        assert_eq!(ring.write_index(), 16);

        let mut out = SampleBuffer::new(1, 16);
        ring.read_block(0, &mut out);
        assert_eq!(out, ramp(1, 34, 16));
    }

    #[test]
    fn test_oldest_valid_index() {
        let mut ring = CircularAudioBuffer::new(1, 16);
        assert_eq!(ring.oldest_valid_index(), 0);
        ring.push(&ramp(1, 0, 20));
        ring.push(&ramp(1, 0, 10));
        assert_eq!(ring.oldest_valid_index(), 10);
    }

    #[test]
    fn test_read_copies_common_channels_only() {
        let mut ring = CircularAudioBuffer::new(1, 8);
        ring.push(&ramp(1, 0, 4));

        let mut out = SampleBuffer::from_channels(vec![vec![-1.0; 4], vec![-1.0; 4]]);
        ring.read_block(0, &mut out);
        assert_eq!(out.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(out.channel(1), &[-1.0; 4]);
    }

    #[test]
    fn test_push_region_and_offset_read() {
        let mut ring = CircularAudioBuffer::new(1, 8);
        let src = ramp(1, 0, 10);
        ring.push_region(&src, 3, 5);
        assert_eq!(ring.write_index(), 5);

        let mut out = SampleBuffer::new(1, 6);
        ring.read(1, &mut out, 2, 3);
        assert_eq!(out.channel(0), &[0.0, 0.0, 4.0, 5.0, 6.0, 0.0]);
    }

    #[test]
    fn test_many_small_pushes_wrap_repeatedly() {
        let mut ring = CircularAudioBuffer::new(1, 10);
        for i in 0..17 {
            ring.push(&ramp(1, i * 3, 3));
        }
        assert_eq!(ring.write_index(), 51);

        let mut out = SampleBuffer::new(1, 10);
        ring.read_block(41, &mut out);
        assert_eq!(out, ramp(1, 41, 10));
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_panics() {
        let _ = CircularAudioBuffer::new(1, 0);
    }
}
