//! File playback example.
//!
//! Plays a WAV file (or a test tone) on the default output device, with
//! read-ahead buffering and sample-rate correction.
//!
//! Run with: cargo run --example play_file -- path/to/file.wav

use std::sync::Arc;
use std::time::Duration;

use stream_transport::{
    event_callback, shared_source, MemoryAudioSource, MockSource, OutputDevice, SharedSource,
    SourceOptions, TimeSliceThread, TransportCoordinator, TransportState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=stream_transport=debug shows the transport's lifecycle
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (source, source_rate): (SharedSource, f64) = match std::env::args().nth(1) {
        Some(path) => {
            let file = MemoryAudioSource::from_wav(&path)?;
            println!("Playing {path} ({} Hz)", file.sample_rate());
            let rate = file.sample_rate();
            (shared_source(file), rate)
        }
        None => {
            println!("No file given, playing a 3 second 440 Hz tone");
            let tone = MockSource::sine(2, 3 * 44100, 440.0, 44100.0);
            (shared_source(tone), 44100.0)
        }
    };

    let read_ahead = Arc::new(TimeSliceThread::start("read-ahead")?);
    let transport = Arc::new(TransportCoordinator::new());
    transport.add_listener(event_callback(|event| println!("Event: {event:?}")));
    transport.set_source(
        Some(source),
        SourceOptions {
            read_ahead_size: 32768,
            read_ahead_thread: Some(read_ahead),
            source_sample_rate: source_rate,
            ..Default::default()
        },
    )?;

    let device = OutputDevice::open_default()?;
    println!("Output device: {}", device.name());
    let playback = device.start_playback(transport.clone())?;

    transport.set_gain(0.5);
    transport.start();

    let mut state = transport.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    while *state.borrow_and_update() == TransportState::Playing {
        ticker.tick().await;
        // delivers end-of-stream from the audio thread
        transport.dispatch_pending_events();
    }

    println!(
        "Stopped at {:.2}s of {:.2}s",
        transport.current_position(),
        transport.length_in_seconds()
    );

    drop(playback);
    transport.set_source(None, SourceOptions::default())?;
    Ok(())
}
