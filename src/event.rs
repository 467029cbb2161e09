//! Transport notifications.
//!
//! Events are change notifications, not errors. Listeners use them to
//! refresh displays or react to the end of a stream.

use std::sync::Arc;

/// Observable state of a [`TransportCoordinator`](crate::TransportCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No source is attached.
    #[default]
    Idle,
    /// A source is attached and the output is silent.
    Stopped,
    /// A source is attached and audio is being delivered.
    Playing,
    /// Playback was stopped but the fade-out block has not run yet.
    FadingOut,
}

/// Notifications broadcast by the transport.
///
/// # Example
///
/// ```
/// use stream_transport::TransportEvent;
///
/// fn handle_event(event: TransportEvent) {
///     match event {
///         TransportEvent::Started => println!("playing"),
///         TransportEvent::Stopped => println!("stopped"),
///         TransportEvent::SourceChanged => println!("new source"),
///         TransportEvent::StreamFinished => println!("end of stream"),
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// `start()` began playback.
    Started,

    /// `stop()` ended playback.
    Stopped,

    /// A different source (or none) was attached.
    SourceChanged,

    /// The audio callback reached the end of a non-looping source and
    /// stopped playback on its own.
    ///
    /// Raised on the audio thread and delivered by
    /// [`dispatch_pending_events`](crate::TransportCoordinator::dispatch_pending_events).
    StreamFinished,
}

/// Callback type for receiving transport events.
///
/// Register with
/// [`TransportCoordinator::add_listener()`](crate::TransportCoordinator::add_listener).
/// Callbacks run on the thread that dispatches the event and must not call
/// back into the transport's control methods.
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_transport::{event_callback, TransportEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(TransportEvent::Started);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(TransportEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_event_debug() {
        let debug = format!("{:?}", TransportEvent::StreamFinished);
        assert!(debug.contains("StreamFinished"));
    }

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(TransportState::default(), TransportState::Idle);
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |event| {
            assert_eq!(event, TransportEvent::Stopped);
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(TransportEvent::Stopped);
        assert!(called.load(Ordering::SeqCst));
    }
}
