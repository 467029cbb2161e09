//! Positionable source over samples held in memory.

use std::path::Path;

use super::{AudioSource, PositionableSource};
use crate::format::deinterleave;
use crate::{BlockRegion, SampleBuffer, TransportError};

/// Plays a [`SampleBuffer`] from memory, optionally looping.
///
/// Reading past the end without looping produces silence while the read
/// position keeps advancing, so the transport can detect the end of the
/// stream. A mono buffer is copied to every output channel.
///
/// # Example
///
/// ```
/// use stream_transport::{MemoryAudioSource, PositionableSource, SampleBuffer};
///
/// let source = MemoryAudioSource::new(SampleBuffer::new(2, 44100), 44100.0);
/// assert_eq!(source.total_length(), 44100);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryAudioSource {
    buffer: SampleBuffer,
    sample_rate: f64,
    position: i64,
    looping: bool,
}

impl MemoryAudioSource {
    /// Creates a source playing `buffer`, recorded at `sample_rate`.
    pub fn new(buffer: SampleBuffer, sample_rate: f64) -> Self {
        Self {
            buffer,
            sample_rate,
            position: 0,
            looping: false,
        }
    }

    /// Loads a WAV file completely into memory.
    ///
    /// Integer samples are scaled to `[-1.0, 1.0)`.
    ///
    /// # Errors
    ///
    /// Returns `Wav` if the file cannot be opened or decoded.
    pub fn from_wav(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path).map_err(|e| TransportError::wav(path, e))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| TransportError::wav(path, e))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| TransportError::wav(path, e))?
            }
        };

        let buffer = deinterleave(&interleaved, usize::from(spec.channels));
        tracing::debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            frames = buffer.num_frames(),
            "Loaded WAV into memory"
        );

        Ok(Self::new(buffer, f64::from(spec.sample_rate)))
    }

    /// Returns the sample rate the buffer was recorded at.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Returns the underlying samples.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    fn copy_frames(&self, region: &mut BlockRegion<'_>, dest: usize, read_from: usize, len: usize) {
        let source_channels = self.buffer.num_channels();
        for ch in 0..region.num_channels() {
            if source_channels == 0 {
                region.buffer.clear_range(region.start + dest, len);
                return;
            }
            let src_ch = ch.min(source_channels - 1);
            region
                .buffer
                .copy_from(ch, region.start + dest, &self.buffer, src_ch, read_from, len);
        }
    }
}

impl AudioSource for MemoryAudioSource {
    fn prepare_to_play(&mut self, _block_size: usize, _sample_rate: f64) {}

    fn release_resources(&mut self) {}

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        let total = self.total_length();
        if total == 0 {
            region.clear();
            self.position += region.len as i64;
            return;
        }

        let mut dest = 0;
        while dest < region.len {
            let read_from = if self.looping {
                self.position.rem_euclid(total)
            } else {
                self.position
            };
            let available = (total - read_from).max(0) as usize;
            let n = (region.len - dest).min(available);

            if n > 0 {
                self.copy_frames(region, dest, read_from as usize, n);
                dest += n;
                self.position += n as i64;
            }

            if !self.looping {
                let rest = region.len - dest;
                region.buffer.clear_range(region.start + dest, rest);
                self.position += rest as i64;
                dest = region.len;
            }
        }
    }
}

impl PositionableSource for MemoryAudioSource {
    fn set_next_read_position(&mut self, position: i64) {
        self.position = position.max(0);
    }

    fn next_read_position(&self) -> i64 {
        if self.looping && self.total_length() > 0 {
            self.position % self.total_length()
        } else {
            self.position
        }
    }

    fn total_length(&self) -> i64 {
        self.buffer.num_frames() as i64
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, should_loop: bool) {
        self.looping = should_loop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> MemoryAudioSource {
        let samples = (0..len).map(|i| i as f32).collect();
        MemoryAudioSource::new(SampleBuffer::from_channels(vec![samples]), 48000.0)
    }

    #[test]
    fn test_reads_sequentially() {
        let mut src = source(10);
        let mut out = SampleBuffer::new(1, 4);
        src.get_next_audio_block(&mut BlockRegion::whole(&mut out));
        assert_eq!(out.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        src.get_next_audio_block(&mut BlockRegion::whole(&mut out));
        assert_eq!(out.channel(0), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(src.next_read_position(), 8);
    }

    #[test]
    fn test_clears_past_end_and_keeps_advancing() {
        let mut src = source(6);
        src.set_next_read_position(4);
        let mut out = SampleBuffer::from_channels(vec![vec![9.0; 4]]);
        src.get_next_audio_block(&mut BlockRegion::whole(&mut out));
        assert_eq!(out.channel(0), &[4.0, 5.0, 0.0, 0.0]);
        assert_eq!(src.next_read_position(), 8);
    }

    #[test]
    fn test_looping_wraps() {
        let mut src = source(5);
        src.set_looping(true);
        src.set_next_read_position(3);
        let mut out = SampleBuffer::new(1, 7);
        src.get_next_audio_block(&mut BlockRegion::whole(&mut out));
        assert_eq!(out.channel(0), &[3.0, 4.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(src.next_read_position(), 0);
    }

    #[test]
    fn test_mono_is_copied_to_all_channels() {
        let mut src = source(4);
        let mut out = SampleBuffer::new(2, 4);
        src.get_next_audio_block(&mut BlockRegion::whole(&mut out));
        assert_eq!(out.channel(0), out.channel(1));
    }

    #[test]
    fn test_negative_position_is_clamped() {
        let mut src = source(4);
        src.set_next_read_position(-20);
        assert_eq!(src.next_read_position(), 0);
    }

    #[test]
    fn test_from_wav_missing_file() {
        let err = MemoryAudioSource::from_wav("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, TransportError::Wav { .. }));
    }
}
