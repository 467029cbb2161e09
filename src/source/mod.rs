//! Audio source abstractions.
//!
//! A source is anything the audio callback can pull blocks from. The
//! transport composes sources into a chain:
//!
//! ```text
//! PositionableSource → [BufferingSource] → [ResamplingSource] → callback
//! ```
//!
//! Sources handed to the transport are shared (`Arc<Mutex<..>>`) because the
//! read-ahead thread and the control thread both reach them.

#[cfg(feature = "device")]
mod device;
mod memory;
mod mock;

#[cfg(feature = "device")]
pub use device::{default_output_device_name, list_output_devices, OutputDevice, PlaybackStream};
pub use memory::MemoryAudioSource;
pub use mock::{MockCounters, MockSource};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::BlockRegion;

/// A pull-based producer of audio blocks.
///
/// `prepare_to_play` and `release_resources` run on control threads and may
/// allocate. `get_next_audio_block` runs on the audio thread and must not
/// block or allocate.
pub trait AudioSource: Send {
    /// Called before playback starts, with the expected block size and the
    /// device sample rate.
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64);

    /// Called after playback stops, to free anything `prepare_to_play` allocated.
    fn release_resources(&mut self);

    /// Fills `region` with the next block of audio.
    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>);
}

/// A source with a seekable read position, such as a file reader.
///
/// Positions are in the source's own sample frames.
pub trait PositionableSource: AudioSource {
    /// Moves the position the next block will be read from.
    fn set_next_read_position(&mut self, position: i64);

    /// Returns the position the next block will be read from.
    fn next_read_position(&self) -> i64;

    /// Returns the total length in frames.
    fn total_length(&self) -> i64;

    /// Returns `true` if the source wraps around at its end.
    fn is_looping(&self) -> bool;

    /// Enables or disables looping. Sources that cannot loop ignore this.
    fn set_looping(&mut self, _should_loop: bool) {}
}

/// A positionable source shared between the transport and its read-ahead thread.
pub type SharedSource = Arc<Mutex<dyn PositionableSource>>;

/// Wraps a source for handing to
/// [`TransportCoordinator::set_source`](crate::TransportCoordinator::set_source).
pub fn shared_source<S: PositionableSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64) {
        (**self).prepare_to_play(block_size, sample_rate);
    }

    fn release_resources(&mut self) {
        (**self).release_resources();
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        (**self).get_next_audio_block(region);
    }
}

/// Direct access to a shared source, used when no read-ahead layer sits in
/// between. Each call takes the source's lock for its duration.
impl AudioSource for SharedSource {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64) {
        self.lock().prepare_to_play(block_size, sample_rate);
    }

    fn release_resources(&mut self) {
        self.lock().release_resources();
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        self.lock().get_next_audio_block(region);
    }
}

impl PositionableSource for SharedSource {
    fn set_next_read_position(&mut self, position: i64) {
        self.lock().set_next_read_position(position);
    }

    fn next_read_position(&self) -> i64 {
        self.lock().next_read_position()
    }

    fn total_length(&self) -> i64 {
        self.lock().total_length()
    }

    fn is_looping(&self) -> bool {
        self.lock().is_looping()
    }

    fn set_looping(&mut self, should_loop: bool) {
        self.lock().set_looping(should_loop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleBuffer;

    #[test]
    fn test_shared_source_forwards_calls() {
        let mut shared = shared_source(MockSource::constant(1, 100, 0.5));
        shared.prepare_to_play(16, 48000.0);
        shared.set_next_read_position(10);
        assert_eq!(shared.next_read_position(), 10);
        assert_eq!(shared.total_length(), 100);

        let mut buffer = SampleBuffer::new(1, 16);
        shared.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        assert_eq!(shared.next_read_position(), 26);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_shared_source_identity() {
        let a = shared_source(MockSource::constant(1, 10, 0.0));
        let b = a.clone();
        let c = shared_source(MockSource::constant(1, 10, 0.0));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
