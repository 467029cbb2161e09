//! Mock positionable source for testing without audio files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{AudioSource, PositionableSource};
use crate::BlockRegion;

/// Lifecycle call counts recorded by a [`MockSource`].
///
/// The counters are shared, so they stay observable after the source has
/// been handed to a transport.
#[derive(Debug, Default)]
pub struct MockCounters {
    prepares: AtomicUsize,
    releases: AtomicUsize,
    blocks: AtomicUsize,
}

impl MockCounters {
    /// Number of `prepare_to_play` calls.
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    /// Number of `release_resources` calls.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Number of `get_next_audio_block` calls.
    pub fn blocks(&self) -> usize {
        self.blocks.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Constant(f32),
    Ramp,
    Sine { frequency: f64, sample_rate: f64 },
}

/// A deterministic source that synthesizes audio for testing.
///
/// This allows exercising the full transport chain without files or
/// hardware, making it suitable for CI environments. Every sample of a
/// ramp source equals its frame position, which makes seeks, resampling
/// and read-ahead easy to verify.
///
/// # Panics
///
/// `release_resources` panics if it is called more often than
/// `prepare_to_play`, so double releases fail the test that caused them.
///
/// # Example
///
/// ```
/// use stream_transport::{AudioSource, BlockRegion, MockSource, SampleBuffer};
///
/// let mut mock = MockSource::ramp(1, 1000);
/// let counters = mock.counters();
///
/// let mut buffer = SampleBuffer::new(1, 4);
/// mock.prepare_to_play(4, 48000.0);
/// mock.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
/// assert_eq!(buffer.channel(0), &[0.0, 1.0, 2.0, 3.0]);
/// assert_eq!(counters.prepares(), 1);
/// ```
#[derive(Debug)]
pub struct MockSource {
    channels: usize,
    length: i64,
    position: i64,
    looping: bool,
    signal: Signal,
    counters: Arc<MockCounters>,
}

impl MockSource {
    fn with_signal(channels: usize, length: i64, signal: Signal) -> Self {
        Self {
            channels,
            length,
            position: 0,
            looping: false,
            signal,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Creates a source emitting `value` on every sample.
    pub fn constant(channels: usize, length: i64, value: f32) -> Self {
        Self::with_signal(channels, length, Signal::Constant(value))
    }

    /// Creates a source whose samples equal their frame position.
    pub fn ramp(channels: usize, length: i64) -> Self {
        Self::with_signal(channels, length, Signal::Ramp)
    }

    /// Creates a full-scale sine source.
    pub fn sine(channels: usize, length: i64, frequency: f64, sample_rate: f64) -> Self {
        Self::with_signal(
            channels,
            length,
            Signal::Sine {
                frequency,
                sample_rate,
            },
        )
    }

    /// Returns the shared lifecycle counters.
    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    fn sample_at(&self, frame: i64) -> f32 {
        match self.signal {
            Signal::Constant(value) => value,
            Signal::Ramp => frame as f32,
            Signal::Sine {
                frequency,
                sample_rate,
            } => {
                let t = frame as f64 / sample_rate;
                (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
            }
        }
    }
}

impl AudioSource for MockSource {
    fn prepare_to_play(&mut self, _block_size: usize, _sample_rate: f64) {
        self.counters.prepares.fetch_add(1, Ordering::SeqCst);
    }

    fn release_resources(&mut self) {
        let releases = self.counters.releases.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(
            releases <= self.counters.prepares(),
            "release_resources called {releases} times for {} prepares",
            self.counters.prepares()
        );
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        self.counters.blocks.fetch_add(1, Ordering::SeqCst);

        for i in 0..region.len {
            let frame = if self.looping && self.length > 0 {
                self.position.rem_euclid(self.length)
            } else {
                self.position
            };
            let value = if frame < self.length {
                self.sample_at(frame)
            } else {
                0.0
            };
            for ch in 0..region.num_channels() {
                let sample = if ch < self.channels { value } else { 0.0 };
                region.channel_mut(ch)[i] = sample;
            }
            self.position += 1;
        }
    }
}

impl PositionableSource for MockSource {
    fn set_next_read_position(&mut self, position: i64) {
        self.position = position;
    }

    fn next_read_position(&self) -> i64 {
        if self.looping && self.length > 0 {
            self.position.rem_euclid(self.length)
        } else {
            self.position
        }
    }

    fn total_length(&self) -> i64 {
        self.length
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
    use crate::SampleBuffer;

    #[test]
    fn test_mock_source_constant() {
        let mut mock = MockSource::constant(2, 100, 0.25);
        let mut buffer = SampleBuffer::new(2, 16);
        mock.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        assert!(buffer.channel(1).iter().all(|&s| s == 0.25));
        assert_eq!(mock.next_read_position(), 16);
    }

    #[test]
    fn test_mock_source_silent_past_end() {
        let mut mock = MockSource::ramp(1, 3);
        let mut buffer = SampleBuffer::new(1, 5);
        mock.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        assert_eq!(buffer.channel(0), &[0.0, 1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mock_source_sine() {
        let mut mock = MockSource::sine(1, 1600, 440.0, 16000.0);
        let mut buffer = SampleBuffer::new(1, 1600);
        mock.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));

        // Sine wave should have positive and negative values
        assert!(buffer.channel(0).iter().any(|&s| s > 0.0));
        assert!(buffer.channel(0).iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_mock_source_looping() {
        let mut mock = MockSource::ramp(1, 4);
        mock.set_looping(true);
        let mut buffer = SampleBuffer::new(1, 6);
        mock.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        assert_eq!(buffer.channel(0), &[0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
        assert_eq!(mock.next_read_position(), 2);
    }

    #[test]
    fn test_mock_counters() {
        let mut mock = MockSource::ramp(1, 4);
        let counters = mock.counters();
        mock.prepare_to_play(64, 44100.0);
        mock.release_resources();
        assert_eq!(counters.prepares(), 1);
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    #[should_panic(expected = "release_resources called 1 times for 0 prepares")]
    fn test_mock_detects_release_without_prepare() {
        let mut mock = MockSource::ramp(1, 4);
        mock.release_resources();
    }
}
