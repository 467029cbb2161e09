//! Configuration types for the transport and its read-ahead layer.

use std::time::Duration;

/// Configuration for [`TransportCoordinator`](crate::TransportCoordinator) behavior.
///
/// Use [`TransportConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_transport::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig {
///     stop_timeout: Duration::from_millis(250),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long `stop()` waits for the audio callback to finish its fade-out.
    ///
    /// The wait is bounded; `stop()` returns when it expires even if the
    /// callback never ran.
    /// Default: 1 second
    pub stop_timeout: Duration,

    /// Length of the linear fade applied to the first block after a stop.
    ///
    /// Samples past the fade are silenced.
    /// Default: 256 samples
    pub fade_out_samples: usize,

    /// Capacity of the queue carrying events from the audio callback.
    ///
    /// Events raised while the queue is full are dropped.
    /// Default: 64
    pub event_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(1),
            fade_out_samples: 256,
            event_queue_capacity: 64,
        }
    }
}

/// Tuning for the read-ahead fill performed on the background thread.
#[derive(Debug, Clone)]
pub struct ReadAheadConfig {
    /// Maximum frames read from the wrapped source per time slice.
    ///
    /// Default: 2048
    pub fill_chunk_frames: usize,

    /// Delay before the next slice when the buffer is already full.
    ///
    /// Default: 100ms
    pub idle_wait: Duration,

    /// Delay before the next slice while the buffer still has room.
    ///
    /// Default: 1ms
    pub busy_wait: Duration,
}

impl Default for ReadAheadConfig {
    fn default() -> Self {
        Self {
            fill_chunk_frames: 2048,
            idle_wait: Duration::from_millis(100),
            busy_wait: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.fade_out_samples, 256);
        assert_eq!(config.event_queue_capacity, 64);
    }

    #[test]
    fn test_read_ahead_config_defaults() {
        let config = ReadAheadConfig::default();
        assert_eq!(config.fill_chunk_frames, 2048);
        assert_eq!(config.idle_wait, Duration::from_millis(100));
        assert_eq!(config.busy_wait, Duration::from_millis(1));
    }
}
