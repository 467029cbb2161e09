//! Bridge from an interleaved device callback to the planar transport.

use std::sync::Arc;

use crate::format::{f32_to_i16, interleave};
use crate::transport::TransportCoordinator;
use crate::{BlockRegion, SampleBuffer};

/// Drives a [`TransportCoordinator`] from an interleaved output callback.
///
/// Device callbacks hand over one interleaved buffer per period, while the
/// transport renders planar blocks. The player owns the planar scratch
/// buffer, sized by [`prepare`](Self::prepare), and renders device buffers
/// in slices of the prepared block size, so an unexpectedly large period
/// does not allocate on the callback.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_transport::{
///     shared_source, MockSource, SourceOptions, TransportCoordinator, TransportPlayer,
/// };
///
/// let transport = Arc::new(TransportCoordinator::new());
/// transport.set_source(Some(shared_source(MockSource::constant(2, 48000, 0.25))), SourceOptions::default())?;
///
/// let mut player = TransportPlayer::new(transport.clone());
/// player.prepare(256, 48000.0, 2);
/// transport.start();
///
/// let mut output = vec![0.0f32; 2 * 256];
/// player.render_interleaved(&mut output);
/// assert!(output.iter().all(|&s| s == 0.25));
/// # Ok::<(), stream_transport::TransportError>(())
/// ```
pub struct TransportPlayer {
    transport: Arc<TransportCoordinator>,
    scratch: SampleBuffer,
    /// Interleaved staging for integer output formats.
    staging: Vec<f32>,
    channels: usize,
    block_size: usize,
}

impl TransportPlayer {
    /// Creates an unprepared player; it outputs silence until prepared.
    pub fn new(transport: Arc<TransportCoordinator>) -> Self {
        Self {
            transport,
            scratch: SampleBuffer::default(),
            staging: Vec::new(),
            channels: 0,
            block_size: 0,
        }
    }

    /// Returns the driven transport.
    pub fn transport(&self) -> &Arc<TransportCoordinator> {
        &self.transport
    }

    /// Sizes the scratch buffers and prepares the transport.
    ///
    /// Call before the device starts, with the device's expected period,
    /// sample rate and channel count.
    pub fn prepare(&mut self, block_size: usize, sample_rate: f64, channels: usize) {
        self.block_size = block_size;
        self.channels = channels;
        self.scratch.set_size(channels, block_size);
        self.staging = vec![0.0; block_size * channels];
        self.transport.prepare_to_play(block_size, sample_rate);
    }

    /// Releases the transport's resources.
    ///
    /// The player outputs silence until it is prepared again.
    pub fn release(&mut self) {
        self.block_size = 0;
        self.channels = 0;
        self.transport.release_resources();
    }

    /// Renders into an interleaved `f32` device buffer.
    pub fn render_interleaved(&mut self, output: &mut [f32]) {
        if self.block_size == 0 || self.channels == 0 {
            output.fill(0.0);
            return;
        }
        for chunk in output.chunks_mut(self.block_size * self.channels) {
            self.render_chunk(chunk);
        }
    }

    /// Renders into an interleaved `i16` device buffer.
    pub fn render_interleaved_i16(&mut self, output: &mut [i16]) {
        if self.block_size == 0 || self.channels == 0 {
            output.fill(0);
            return;
        }
        let mut staging = std::mem::take(&mut self.staging);
        for chunk in output.chunks_mut(self.block_size * self.channels) {
            let staged = &mut staging[..chunk.len()];
            self.render_chunk(staged);
            for (out, &sample) in chunk.iter_mut().zip(staged.iter()) {
                *out = f32_to_i16(sample);
            }
        }
        self.staging = staging;
    }

    fn render_chunk(&mut self, chunk: &mut [f32]) {
        let frames = chunk.len() / self.channels;
        self.transport
            .get_next_audio_block(&mut BlockRegion::new(&mut self.scratch, 0, frames));
        interleave(&self.scratch, &mut chunk[..frames * self.channels], self.channels);
        chunk[frames * self.channels..].fill(0.0);
    }
}
