//! Sample format and channel layout conversion.

use crate::SampleBuffer;

/// Converts an f32 sample to i16.
///
/// Input should be in the range [-1.0, 1.0].
/// Values outside this range are clamped.
///
/// Uses × 32767 (not 32768) for symmetric scaling, so -1.0 maps to -32767.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Converts an i16 sample to f32.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Splits interleaved samples into a planar [`SampleBuffer`].
///
/// A trailing partial frame is dropped.
pub fn deinterleave(interleaved: &[f32], channels: usize) -> SampleBuffer {
    if channels == 0 {
        return SampleBuffer::default();
    }
    let frames = interleaved.len() / channels;
    let mut buffer = SampleBuffer::new(channels, frames);
    for ch in 0..channels {
        let dest = buffer.channel_mut(ch);
        for (frame, sample) in dest.iter_mut().enumerate() {
            *sample = interleaved[frame * channels + ch];
        }
    }
    buffer
}

/// Writes the frames of `buffer` into `output` as interleaved samples.
///
/// `output` holds `output.len() / channels` frames for `channels` device
/// channels. Device channels the buffer lacks are zeroed, and extra buffer
/// channels are dropped.
pub fn interleave(buffer: &SampleBuffer, output: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    let frames = (output.len() / channels).min(buffer.num_frames());
    for ch in 0..channels {
        if ch < buffer.num_channels() {
            let src = buffer.channel(ch);
            for frame in 0..frames {
                output[frame * channels + ch] = src[frame];
            }
        } else {
            for frame in 0..frames {
                output[frame * channels + ch] = 0.0;
            }
        }
    }
}
