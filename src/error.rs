//! Error types for stream-transport.
//!
//! Errors are split into two categories:
//! - **Block errors** ([`BlockError`]): failures on the fixed-block adapter
//!   path, returned from every `read`/`write` call instead of a sentinel count
//! - **Transport errors** ([`TransportError`]): misconfiguration of the
//!   transport or its collaborators (sources, read-ahead thread, device)
//!
//! Runtime conditions such as end of stream are not errors; they surface as
//! [`TransportEvent`](crate::TransportEvent)s.

use std::path::PathBuf;

/// Errors produced by [`FixedBlockReader`](crate::FixedBlockReader),
/// [`FixedBlockWriter`](crate::FixedBlockWriter) and the
/// [`FixedBlockProcessor`](crate::FixedBlockProcessor)s they drive.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// The adapter was used before `open()` or after `close()`.
    #[error("block adapter is not open")]
    NotOpen,

    /// A block size of zero was requested.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// The processor accepted fewer bytes than a full staged block.
    ///
    /// Processors are expected to consume a full block or fail.
    #[error("short write: processor accepted {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the adapter handed over.
        expected: usize,
        /// Bytes the processor reported as written.
        written: usize,
    },

    /// The processor made no progress on a full-block write.
    #[error("processor accepted no data for a full block")]
    Stalled,

    /// The processor reported a failure of its own.
    #[error("processor failed: {0}")]
    Processor(String),

    /// I/O error from a processor backed by a stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlockError {
    /// Creates a processor error with the given message.
    pub fn processor(msg: impl Into<String>) -> Self {
        Self::Processor(msg.into())
    }
}

/// Errors that prevent a transport or one of its sources from being set up.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Read-ahead buffering was requested without a background thread.
    #[error("read-ahead of {read_ahead_size} frames requested without a read-ahead thread")]
    MissingReadAheadThread {
        /// The requested read-ahead size in frames.
        read_ahead_size: usize,
    },

    /// A sample rate that is not finite and positive was supplied.
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// A WAV file could not be opened or decoded.
    #[error("wav error: {path}: {source}")]
    Wav {
        /// Path to the file.
        path: PathBuf,
        /// The underlying decoder error.
        #[source]
        source: hound::Error,
    },

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultDevice,

    /// The requested output device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// The device's sample format is not supported.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl TransportError {
    /// Creates a WAV error for the given path.
    pub fn wav(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        Self::Wav {
            path: path.into(),
            source,
        }
    }
}
