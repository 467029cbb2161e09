//! Read-ahead pipeline components.
//!
//! The read-ahead layer decouples a slow source from the audio callback:
//!
//! ```text
//! Source → Fill (time-slice thread) → CircularAudioBuffer → Audio callback
//! ```
//!
//! - **CircularAudioBuffer**: planar ring addressed by a monotonic frame index
//! - **TimeSliceThread**: background thread that runs fills round-robin
//! - **BufferingSource**: keeps the ring ahead of the play position
//!
//! The audio callback only copies out of the ring, so it never waits on the
//! wrapped source.

mod buffering;
mod ring_buffer;
mod time_slice;

pub use buffering::BufferingSource;
pub use ring_buffer::CircularAudioBuffer;
pub use time_slice::{ReadAheadScheduler, TimeSliceClient, TimeSliceThread};
