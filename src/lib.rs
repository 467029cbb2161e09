//! # stream-transport
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio streaming core: fixed-block adapters, a circular audio
//! buffer, and a playback transport with read-ahead and resampling.
//!
//! `stream-transport` bridges a hardware-clocked audio callback with
//! upstream components that work in their own block sizes and sample
//! rates, without locking up or allocating on the audio thread.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stream_transport::{
//!     event_callback, shared_source, MemoryAudioSource, OutputDevice, SourceOptions, TimeSliceThread,
//!     TransportCoordinator,
//! };
//!
//! let file = MemoryAudioSource::from_wav("song.wav")?;
//! let rate = file.sample_rate();
//!
//! let read_ahead = Arc::new(TimeSliceThread::start("read-ahead")?);
//! let transport = Arc::new(TransportCoordinator::new());
//! transport.set_source(
//!     Some(shared_source(file)),
//!     SourceOptions {
//!         read_ahead_size: 32768,
//!         read_ahead_thread: Some(read_ahead),
//!         source_sample_rate: rate,
//!         ..Default::default()
//!     },
//! )?;
//! transport.add_listener(event_callback(|e| tracing::info!(?e, "transport event")));
//!
//! let playback = OutputDevice::open_default()?.start_playback(transport.clone())?;
//! transport.start();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Audio Thread**: pulls [`TransportCoordinator::get_next_audio_block`];
//!   never allocates, never logs, and only waits for brief pointer swaps
//! - **Read-ahead Thread**: a [`TimeSliceThread`] fills each
//!   [`BufferingSource`]'s [`CircularAudioBuffer`] from the slow source
//! - **Control Threads**: `set_source`, `start`, `stop` and seeks; events
//!   raised on the audio thread reach them through a lock-free queue
//!
//! Codecs and analyzers that need exact block sizes sit behind
//! [`FixedBlockReader`] and [`FixedBlockWriter`].

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats and positions
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod block;
mod buffer;
mod config;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod player;
pub mod source;
mod transport;

pub use block::{FixedBlockAdapter, FixedBlockProcessor, FixedBlockReader, FixedBlockWriter};
pub use buffer::{BlockRegion, SampleBuffer};
pub use config::{ReadAheadConfig, TransportConfig};
pub use error::{BlockError, TransportError};
pub use event::{event_callback, EventCallback, TransportEvent, TransportState};
pub use format::ResamplingSource;
pub use pipeline::{
    BufferingSource, CircularAudioBuffer, ReadAheadScheduler, TimeSliceClient, TimeSliceThread,
};
pub use player::TransportPlayer;
pub use source::{
    shared_source, AudioSource, MemoryAudioSource, MockCounters, MockSource, PositionableSource,
    SharedSource,
};
#[cfg(feature = "device")]
pub use source::{default_output_device_name, list_output_devices, OutputDevice, PlaybackStream};
pub use transport::{SourceOptions, TransportCoordinator};
