//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Sample format conversion (f32 ↔ i16)
//! - Channel layout conversion (planar ↔ interleaved)
//! - Sample rate conversion (streaming resampling)

mod convert;
mod resample;

pub use convert::{deinterleave, f32_to_i16, i16_to_f32, interleave};
pub use resample::ResamplingSource;
