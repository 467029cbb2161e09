//! Sample rate conversion.
//!
//! This module provides streaming resampling using linear interpolation,
//! which is fast but may introduce artifacts for large rate changes.

use crate::source::AudioSource;
use crate::{BlockRegion, SampleBuffer};

/// Ratios this close to 1.0 are treated as pass-through.
const UNITY_TOLERANCE: f64 = 1.0e-9;

/// A source that changes the sample rate of another source.
///
/// The ratio is input samples per output sample, so a 44.1 kHz source
/// played on a 48 kHz device uses `44100.0 / 48000.0`. Interpolation state
/// carries across blocks, so output is continuous regardless of how the
/// callback splits it. The first output sample after construction or
/// [`flush_buffers`](Self::flush_buffers) equals the first input sample.
///
/// # Example
///
/// ```
/// use stream_transport::{AudioSource, BlockRegion, MockSource, ResamplingSource, SampleBuffer};
///
/// let mut resampler = ResamplingSource::new(MockSource::ramp(1, 1000), 1);
/// resampler.set_resampling_ratio(0.5);
/// resampler.prepare_to_play(8, 48000.0);
///
/// let mut buffer = SampleBuffer::new(1, 4);
/// resampler.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
/// assert_eq!(buffer.channel(0), &[0.0, 0.5, 1.0, 1.5]);
/// ```
#[derive(Debug)]
pub struct ResamplingSource<S> {
    input: S,
    ratio: f64,
    channels: usize,
    /// Output frames rendered per input pull.
    max_block: usize,
    scratch: SampleBuffer,
    /// Last two input samples per channel.
    history: Vec<[f32; 2]>,
    /// Position between the two history samples, in input samples.
    phase: f64,
}

impl<S: AudioSource> ResamplingSource<S> {
    /// Wraps `input`, converting up to `channels` channels.
    pub fn new(input: S, channels: usize) -> Self {
        Self {
            input,
            ratio: 1.0,
            channels,
            max_block: 0,
            scratch: SampleBuffer::default(),
            history: vec![[0.0; 2]; channels],
            phase: 2.0,
        }
    }

    /// Sets how many input samples are consumed per output sample.
    ///
    /// Non-positive ratios are clamped to the smallest positive value.
    pub fn set_resampling_ratio(&mut self, ratio: f64) {
        debug_assert!(ratio > 0.0, "resampling ratio must be positive");
        self.ratio = ratio.max(f64::MIN_POSITIVE);
    }

    /// Returns the current resampling ratio.
    pub fn resampling_ratio(&self) -> f64 {
        self.ratio
    }

    /// Drops the interpolation history, as after a seek.
    pub fn flush_buffers(&mut self) {
        for history in &mut self.history {
            *history = [0.0; 2];
        }
        self.phase = 2.0;
    }

    /// Returns the wrapped source.
    pub fn inner(&self) -> &S {
        &self.input
    }

    /// Returns the wrapped source for modification.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.input
    }

    fn is_pass_through(&self) -> bool {
        (self.ratio - 1.0).abs() < UNITY_TOLERANCE
    }

    /// Counts the input samples consumed while producing `frames` outputs.
    fn input_needed(&self, frames: usize) -> usize {
        let mut phase = self.phase;
        let mut needed = 0;
        for _ in 0..frames {
            while phase >= 1.0 {
                needed += 1;
                phase -= 1.0;
            }
            phase += self.ratio;
        }
        needed
    }

    fn input_capacity(&self, block_size: usize) -> usize {
        (block_size as f64 * self.ratio).ceil() as usize + 3
    }

    fn render(&mut self, region: &mut BlockRegion<'_>, offset: usize, frames: usize) {
        let needed = self.input_needed(frames);
        if needed > 0 {
            self.input
                .get_next_audio_block(&mut BlockRegion::new(&mut self.scratch, 0, needed));
        }

        let start_phase = self.phase;
        let region_channels = region.num_channels();
        for ch in 0..self.channels {
            let mut out = if ch < region_channels {
                Some(&mut region.channel_mut(ch)[offset..offset + frames])
            } else {
                None
            };

            let input = &self.scratch.channel(ch)[..needed];
            let [mut x0, mut x1] = self.history[ch];
            let mut phase = start_phase;
            let mut next = 0;
            for i in 0..frames {
                while phase >= 1.0 {
                    x0 = x1;
                    x1 = input[next];
                    next += 1;
                    phase -= 1.0;
                }
                if let Some(out) = out.as_deref_mut() {
                    out[i] = x0 + (x1 - x0) * phase as f32;
                }
                phase += self.ratio;
            }
            self.history[ch] = [x0, x1];
        }

        for ch in self.channels..region_channels {
            region.channel_mut(ch)[offset..offset + frames].fill(0.0);
        }

        self.phase = self.advance_phase(frames);
    }

    fn advance_phase(&self, frames: usize) -> f64 {
        let mut phase = self.phase;
        for _ in 0..frames {
            while phase >= 1.0 {
                phase -= 1.0;
            }
            phase += self.ratio;
        }
        phase
    }
}

impl<S: AudioSource> AudioSource for ResamplingSource<S> {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64) {
        self.input.prepare_to_play(block_size, sample_rate * self.ratio);
        self.max_block = block_size.max(1);
        let capacity = self.input_capacity(self.max_block);
        self.scratch.set_size(self.channels, capacity);
        self.flush_buffers();
    }

    fn release_resources(&mut self) {
        self.input.release_resources();
        self.scratch = SampleBuffer::default();
        self.max_block = 0;
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        if self.is_pass_through() {
            self.input.get_next_audio_block(region);
            return;
        }
        if self.max_block == 0 {
            // not prepared
            region.clear();
            return;
        }

        let mut offset = 0;
        while offset < region.len {
            let frames = (region.len - offset).min(self.max_block);
            self.render(region, offset, frames);
            offset += frames;
        }
    }
}
