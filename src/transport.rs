//! Start/stop/seek coordination over a chain of audio sources.
//!
//! The transport owns a chain built from the caller's source:
//!
//! ```text
//! SharedSource → [BufferingSource] → [ResamplingSource] → get_next_audio_block
//! ```
//!
//! The audio callback and every control method share one lock around the
//! chain. Control methods do their allocation before taking it, so the
//! callback only ever waits for a pointer swap.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::watch;

use crate::config::{ReadAheadConfig, TransportConfig};
use crate::event::{EventCallback, TransportEvent, TransportState};
use crate::format::ResamplingSource;
use crate::pipeline::{BufferingSource, ReadAheadScheduler};
use crate::source::{AudioSource, PositionableSource, SharedSource};
use crate::{BlockRegion, TransportError};

/// How a source is wrapped when it is attached with
/// [`TransportCoordinator::set_source`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_transport::{SourceOptions, TimeSliceThread};
///
/// let thread = Arc::new(TimeSliceThread::start("read-ahead")?);
/// let options = SourceOptions {
///     read_ahead_size: 32768,
///     read_ahead_thread: Some(thread),
///     source_sample_rate: 44100.0,
///     ..Default::default()
/// };
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Clone)]
pub struct SourceOptions {
    /// Frames to buffer ahead on a background thread; 0 disables read-ahead.
    ///
    /// Default: 0
    pub read_ahead_size: usize,

    /// The thread that fills the read-ahead buffer.
    ///
    /// Required when `read_ahead_size > 0`.
    /// Default: None
    pub read_ahead_thread: Option<Arc<dyn ReadAheadScheduler>>,

    /// The source's native sample rate, or 0 to play it at the device rate.
    ///
    /// Default: 0.0
    pub source_sample_rate: f64,

    /// Channels carried through the read-ahead and resampling layers.
    ///
    /// Default: 2
    pub max_channels: usize,

    /// Tuning for the read-ahead fill.
    pub read_ahead: ReadAheadConfig,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            read_ahead_size: 0,
            read_ahead_thread: None,
            source_sample_rate: 0.0,
            max_channels: 2,
            read_ahead: ReadAheadConfig::default(),
        }
    }
}

impl std::fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceOptions")
            .field("read_ahead_size", &self.read_ahead_size)
            .field("read_ahead_thread", &self.read_ahead_thread.is_some())
            .field("source_sample_rate", &self.source_sample_rate)
            .field("max_channels", &self.max_channels)
            .field("read_ahead", &self.read_ahead)
            .finish()
    }
}

/// The positionable layer of the chain.
enum PositionableStage {
    Raw(SharedSource),
    Buffered(BufferingSource),
}

impl AudioSource for PositionableStage {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64) {
        match self {
            Self::Raw(source) => source.prepare_to_play(block_size, sample_rate),
            Self::Buffered(source) => source.prepare_to_play(block_size, sample_rate),
        }
    }

    fn release_resources(&mut self) {
        match self {
            Self::Raw(source) => source.release_resources(),
            Self::Buffered(source) => source.release_resources(),
        }
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        match self {
            Self::Raw(source) => source.get_next_audio_block(region),
            Self::Buffered(source) => source.get_next_audio_block(region),
        }
    }
}

impl PositionableSource for PositionableStage {
    fn set_next_read_position(&mut self, position: i64) {
        match self {
            Self::Raw(source) => source.set_next_read_position(position),
            Self::Buffered(source) => source.set_next_read_position(position),
        }
    }

    fn next_read_position(&self) -> i64 {
        match self {
            Self::Raw(source) => source.next_read_position(),
            Self::Buffered(source) => source.next_read_position(),
        }
    }

    fn total_length(&self) -> i64 {
        match self {
            Self::Raw(source) => source.total_length(),
            Self::Buffered(source) => source.total_length(),
        }
    }

    fn is_looping(&self) -> bool {
        match self {
            Self::Raw(source) => source.is_looping(),
            Self::Buffered(source) => source.is_looping(),
        }
    }

    fn set_looping(&mut self, should_loop: bool) {
        match self {
            Self::Raw(source) => source.set_looping(should_loop),
            Self::Buffered(source) => source.set_looping(should_loop),
        }
    }
}

/// The outermost layer, pulled by the audio callback.
enum MasterSource {
    Direct(PositionableStage),
    Resampled(ResamplingSource<PositionableStage>),
}

impl MasterSource {
    fn stage(&self) -> &PositionableStage {
        match self {
            Self::Direct(stage) => stage,
            Self::Resampled(resampler) => resampler.inner(),
        }
    }

    fn stage_mut(&mut self) -> &mut PositionableStage {
        match self {
            Self::Direct(stage) => stage,
            Self::Resampled(resampler) => resampler.inner_mut(),
        }
    }

    fn as_audio_source(&mut self) -> &mut dyn AudioSource {
        match self {
            Self::Direct(stage) => stage,
            Self::Resampled(resampler) => resampler,
        }
    }
}

/// A built source chain.
struct Chain {
    source: SharedSource,
    master: MasterSource,
    source_sample_rate: f64,
    prepared: bool,
}

impl Chain {
    fn build(source: SharedSource, options: &SourceOptions) -> Result<Self, TransportError> {
        let stage = if options.read_ahead_size > 0 {
            let scheduler = options.read_ahead_thread.clone().ok_or(
                TransportError::MissingReadAheadThread {
                    read_ahead_size: options.read_ahead_size,
                },
            )?;
            PositionableStage::Buffered(BufferingSource::new(
                Arc::clone(&source),
                scheduler,
                options.read_ahead_size,
                options.max_channels,
                options.read_ahead.clone(),
            ))
        } else {
            PositionableStage::Raw(Arc::clone(&source))
        };

        let master = if options.source_sample_rate > 0.0 {
            MasterSource::Resampled(ResamplingSource::new(stage, options.max_channels))
        } else {
            MasterSource::Direct(stage)
        };

        Ok(Self {
            source,
            master,
            source_sample_rate: options.source_sample_rate,
            prepared: false,
        })
    }

    /// Source frames per device frame, when both rates are known.
    fn rate_ratio(&self, device_rate: f64) -> Option<f64> {
        (self.source_sample_rate > 0.0 && device_rate > 0.0)
            .then(|| self.source_sample_rate / device_rate)
    }

    fn prepare(&mut self, block_size: usize, device_rate: f64) {
        if let (Some(ratio), MasterSource::Resampled(resampler)) =
            (self.rate_ratio(device_rate), &mut self.master)
        {
            resampler.set_resampling_ratio(ratio);
        }
        self.master
            .as_audio_source()
            .prepare_to_play(block_size, device_rate);
        self.prepared = true;
    }

    fn release(&mut self) {
        if self.prepared {
            self.master.as_audio_source().release_resources();
            self.prepared = false;
        }
    }

    fn flush_resampler(&mut self) {
        if let MasterSource::Resampled(resampler) = &mut self.master {
            resampler.flush_buffers();
        }
    }

    fn reached_end(&self) -> bool {
        let stage = self.master.stage();
        !stage.is_looping() && stage.next_read_position() >= stage.total_length()
    }
}

/// State guarded by the callback lock.
struct TransportInner {
    chain: Option<Chain>,
    sample_rate: f64,
    block_size: usize,
    is_prepared: bool,
    last_gain: f32,
    /// Audio-thread side of the event queue.
    events: HeapProd<TransportEvent>,
}

/// Coordinates playback of a positionable source.
///
/// The transport wraps the source in optional read-ahead and resampling
/// layers, and exposes start, stop and seek in device-clock units. The
/// audio callback calls [`get_next_audio_block`](Self::get_next_audio_block);
/// all other methods are for control threads. Every method takes `&self`,
/// so the transport is typically shared in an `Arc`.
///
/// Stopping fades the next block out instead of cutting it, and
/// [`stop`](Self::stop) waits (bounded by
/// [`TransportConfig::stop_timeout`]) until that block has been rendered.
/// A non-looping source that reaches its end stops playback by itself and
/// raises [`TransportEvent::StreamFinished`].
///
/// The audio device must be stopped before the transport is dropped.
///
/// # Example
///
/// ```
/// use stream_transport::{
///     shared_source, BlockRegion, MockSource, SampleBuffer, SourceOptions,
///     TransportCoordinator, TransportState,
/// };
///
/// let transport = TransportCoordinator::new();
/// transport.set_source(Some(shared_source(MockSource::constant(2, 48000, 0.5))), SourceOptions::default())?;
/// transport.prepare_to_play(512, 48000.0);
/// transport.start();
///
/// let mut buffer = SampleBuffer::new(2, 512);
/// transport.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
/// assert_eq!(buffer.channel(0)[0], 0.5);
/// assert_eq!(transport.state(), TransportState::Playing);
/// # Ok::<(), stream_transport::TransportError>(())
/// ```
pub struct TransportCoordinator {
    inner: Mutex<TransportInner>,
    playing: AtomicBool,
    /// True once the last delivered block was silence.
    stopped: AtomicBool,
    has_source: AtomicBool,
    stream_finished: AtomicBool,
    /// `f32` bits.
    gain: AtomicU32,
    stop_signal: Mutex<()>,
    stop_done: Condvar,
    pending_events: Mutex<HeapCons<TransportEvent>>,
    listeners: Mutex<Vec<EventCallback>>,
    state_tx: watch::Sender<TransportState>,
    config: TransportConfig,
}

impl TransportCoordinator {
    /// Creates an idle transport with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    /// Creates an idle transport with the given configuration.
    pub fn with_config(config: TransportConfig) -> Self {
        let (producer, consumer) = HeapRb::new(config.event_queue_capacity.max(1)).split();
        let (state_tx, _) = watch::channel(TransportState::Idle);

        Self {
            inner: Mutex::new(TransportInner {
                chain: None,
                sample_rate: 0.0,
                block_size: 0,
                is_prepared: false,
                last_gain: 1.0,
                events: producer,
            }),
            playing: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            has_source: AtomicBool::new(false),
            stream_finished: AtomicBool::new(false),
            gain: AtomicU32::new(1.0f32.to_bits()),
            stop_signal: Mutex::new(()),
            stop_done: Condvar::new(),
            pending_events: Mutex::new(consumer),
            listeners: Mutex::new(Vec::new()),
            state_tx,
            config,
        }
    }

    /// Returns the transport's configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Attaches a source, or detaches the current one with `None`.
    ///
    /// The new chain is built and, if the transport is already prepared,
    /// prepared before it is swapped in. The old chain is released after
    /// the swap, so the audio callback never sees a half-released chain.
    /// Playback is stopped and the new source starts at position 0.
    ///
    /// Attaching the source that is already attached detaches it first, so
    /// its resources are released once and prepared again with the new
    /// options. Detaching when nothing is attached does nothing.
    ///
    /// # Errors
    ///
    /// Returns `MissingReadAheadThread` if `read_ahead_size > 0` without a
    /// `read_ahead_thread`, and `InvalidSampleRate` if `source_sample_rate`
    /// is negative or not finite. The current source stays attached.
    pub fn set_source(
        &self,
        source: Option<SharedSource>,
        options: SourceOptions,
    ) -> Result<(), TransportError> {
        let Some(source) = source else {
            self.detach();
            return Ok(());
        };

        if !options.source_sample_rate.is_finite() || options.source_sample_rate < 0.0 {
            return Err(TransportError::InvalidSampleRate(options.source_sample_rate));
        }
        let mut chain = Chain::build(Arc::clone(&source), &options)?;

        let is_current = self
            .inner
            .lock()
            .chain
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.source, &source));
        if is_current {
            self.detach();
        }

        chain.master.stage_mut().set_next_read_position(0);

        let (is_prepared, block_size, sample_rate) = {
            let inner = self.inner.lock();
            (inner.is_prepared, inner.block_size, inner.sample_rate)
        };
        if is_prepared {
            chain.prepare(block_size, sample_rate);
        }

        tracing::debug!(
            read_ahead_size = options.read_ahead_size,
            source_sample_rate = options.source_sample_rate,
            max_channels = options.max_channels,
            prepared = is_prepared,
            "Attaching source"
        );

        let old = self.swap_chain(Some(chain));
        if let Some(mut old) = old {
            old.release();
        }

        self.broadcast(TransportEvent::SourceChanged);
        self.dispatch_pending_events();
        Ok(())
    }

    fn detach(&self) {
        let Some(mut old) = self.swap_chain(None) else {
            return;
        };
        old.release();
        tracing::debug!("Source detached");
        self.broadcast(TransportEvent::SourceChanged);
    }

    fn swap_chain(&self, chain: Option<Chain>) -> Option<Chain> {
        let mut inner = self.inner.lock();
        if inner.chain.is_none() && chain.is_none() {
            return None;
        }
        self.has_source.store(chain.is_some(), Ordering::Release);
        self.playing.store(false, Ordering::Release);
        self.stream_finished.store(false, Ordering::Release);
        std::mem::replace(&mut inner.chain, chain)
    }

    /// Prepares the chain for playback at the device's block size and rate.
    pub fn prepare_to_play(&self, block_size: usize, sample_rate: f64) {
        let mut inner = self.inner.lock();
        inner.sample_rate = sample_rate;
        inner.block_size = block_size;
        inner.is_prepared = true;
        if let Some(chain) = inner.chain.as_mut() {
            chain.prepare(block_size, sample_rate);
        }
        self.stream_finished.store(false, Ordering::Release);
        tracing::debug!(block_size, sample_rate, "Transport prepared");
    }

    /// Releases what `prepare_to_play` allocated.
    pub fn release_resources(&self) {
        let mut inner = self.inner.lock();
        if let Some(chain) = inner.chain.as_mut() {
            chain.release();
        }
        inner.is_prepared = false;
    }

    /// Starts playback if a source is attached and it is not already playing.
    pub fn start(&self) {
        let started = {
            let inner = self.inner.lock();
            if inner.chain.is_some() && !self.playing.load(Ordering::Acquire) {
                self.stream_finished.store(false, Ordering::Release);
                self.stopped.store(false, Ordering::Release);
                self.playing.store(true, Ordering::Release);
                true
            } else {
                false
            }
        };

        if started {
            tracing::info!("Transport started");
            self.broadcast(TransportEvent::Started);
        }
        self.dispatch_pending_events();
    }

    /// Stops playback and waits for the fade-out block to be rendered.
    ///
    /// The wait ends after [`TransportConfig::stop_timeout`] even if the
    /// audio callback never ran; the transport is stopped either way.
    pub fn stop(&self) {
        let was_playing = {
            let _inner = self.inner.lock();
            self.playing.swap(false, Ordering::AcqRel)
        };

        if was_playing {
            let deadline = Instant::now() + self.config.stop_timeout;
            let mut guard = self.stop_signal.lock();
            while !self.stopped.load(Ordering::Acquire) {
                if self.stop_done.wait_until(&mut guard, deadline).timed_out() {
                    if !self.stopped.load(Ordering::Acquire) {
                        tracing::warn!(
                            timeout_ms = self.config.stop_timeout.as_millis(),
                            "Timed out waiting for fade-out"
                        );
                    }
                    break;
                }
            }
            drop(guard);

            tracing::info!("Transport stopped");
            self.broadcast(TransportEvent::Stopped);
        }
        self.dispatch_pending_events();
    }

    /// Returns `true` while playback is requested.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Returns `true` if playback stopped because the source ran out.
    ///
    /// Cleared by `start`, seeks and source changes.
    pub fn has_stream_finished(&self) -> bool {
        self.stream_finished.load(Ordering::Acquire)
    }

    /// Returns the current transport state.
    pub fn state(&self) -> TransportState {
        if !self.has_source.load(Ordering::Acquire) {
            TransportState::Idle
        } else if self.playing.load(Ordering::Acquire) {
            TransportState::Playing
        } else if self.stopped.load(Ordering::Acquire) {
            TransportState::Stopped
        } else {
            TransportState::FadingOut
        }
    }

    /// Sets the output gain. Changes are ramped over the next block.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Release);
    }

    /// Returns the output gain.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    /// Returns the device sample rate given to `prepare_to_play`, or 0.
    pub fn sample_rate(&self) -> f64 {
        self.inner.lock().sample_rate
    }

    /// Moves playback to `seconds` on the device clock.
    ///
    /// Ignored until the transport has been prepared.
    pub fn set_position(&self, seconds: f64) {
        let sample_rate = self.sample_rate();
        if sample_rate > 0.0 {
            self.set_next_read_position((seconds * sample_rate) as i64);
        }
    }

    /// Returns the playback position in seconds on the device clock.
    pub fn current_position(&self) -> f64 {
        let sample_rate = self.sample_rate();
        if sample_rate > 0.0 {
            self.next_read_position() as f64 / sample_rate
        } else {
            0.0
        }
    }

    /// Returns the source's length in seconds.
    pub fn length_in_seconds(&self) -> f64 {
        let sample_rate = self.sample_rate();
        if sample_rate > 0.0 {
            self.total_length() as f64 / sample_rate
        } else {
            0.0
        }
    }

    /// Moves playback to a position in device frames.
    pub fn set_next_read_position(&self, position: i64) {
        let mut inner = self.inner.lock();
        let sample_rate = inner.sample_rate;
        if let Some(chain) = inner.chain.as_mut() {
            let position = match chain.rate_ratio(sample_rate) {
                Some(ratio) => (position as f64 * ratio) as i64,
                None => position,
            };
            chain.master.stage_mut().set_next_read_position(position);
            chain.flush_resampler();
            self.stream_finished.store(false, Ordering::Release);
        }
    }

    /// Returns the playback position in device frames.
    pub fn next_read_position(&self) -> i64 {
        let inner = self.inner.lock();
        inner.chain.as_ref().map_or(0, |chain| {
            let position = chain.master.stage().next_read_position();
            match chain.rate_ratio(inner.sample_rate) {
                Some(ratio) => (position as f64 / ratio) as i64,
                None => position,
            }
        })
    }

    /// Returns the source's length in device frames.
    pub fn total_length(&self) -> i64 {
        let inner = self.inner.lock();
        inner.chain.as_ref().map_or(0, |chain| {
            let length = chain.master.stage().total_length();
            match chain.rate_ratio(inner.sample_rate) {
                Some(ratio) => (length as f64 / ratio) as i64,
                None => length,
            }
        })
    }

    /// Returns `true` if the attached source loops.
    pub fn is_looping(&self) -> bool {
        self.inner
            .lock()
            .chain
            .as_ref()
            .is_some_and(|chain| chain.master.stage().is_looping())
    }

    /// Registers a listener for transport events.
    pub fn add_listener(&self, listener: EventCallback) {
        self.listeners.lock().push(listener);
    }

    /// Returns a receiver that tracks the transport state.
    ///
    /// The value is updated each time an event is broadcast.
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    /// Delivers events raised by the audio callback to listeners.
    ///
    /// Call this periodically from a control thread. Returns the number of
    /// events delivered.
    pub fn dispatch_pending_events(&self) -> usize {
        let events: Vec<TransportEvent> = {
            let mut pending = self.pending_events.lock();
            std::iter::from_fn(|| pending.try_pop()).collect()
        };
        for &event in &events {
            self.broadcast(event);
        }
        events.len()
    }

    fn broadcast(&self, event: TransportEvent) {
        let state = self.state();
        self.state_tx.send_replace(state);
        tracing::debug!(?event, ?state, "Transport event");

        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Renders the next block of output. Called from the audio callback.
    ///
    /// Fills `region` from the chain while playing. The first block after
    /// a stop is faded out over [`TransportConfig::fade_out_samples`] and
    /// everything after it is silence. Gain changes are ramped linearly
    /// across the block.
    pub fn get_next_audio_block(&self, region: &mut BlockRegion<'_>) {
        let mut inner = self.inner.lock();
        let gain = self.gain();
        let last_gain = inner.last_gain;
        let inner = &mut *inner;

        match inner.chain.as_mut() {
            Some(chain) if !chain.prepared => {
                region.clear();
                if !self.playing.load(Ordering::Acquire) {
                    self.mark_stopped();
                }
            }
            Some(chain) if !self.stopped.load(Ordering::Acquire) => {
                chain.master.as_audio_source().get_next_audio_block(region);

                let mut playing = self.playing.load(Ordering::Acquire);
                if playing && chain.reached_end() {
                    playing = false;
                    self.playing.store(false, Ordering::Release);
                    self.stream_finished.store(true, Ordering::Release);
                    // a full queue drops the event; the flag still records it
                    let _ = inner.events.try_push(TransportEvent::StreamFinished);
                }

                if !playing {
                    let fade = self.config.fade_out_samples.min(region.len);
                    for ch in 0..region.num_channels() {
                        region.buffer.apply_gain_ramp(ch, region.start, fade, 1.0, 0.0);
                    }
                    region.sub_region(fade, region.len - fade).clear();
                    self.mark_stopped();
                }

                for ch in 0..region.num_channels() {
                    region
                        .buffer
                        .apply_gain_ramp(ch, region.start, region.len, last_gain, gain);
                }
            }
            _ => {
                region.clear();
                self.mark_stopped();
            }
        }

        inner.last_gain = gain;
    }

    fn mark_stopped(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            // taking the lock orders this with a waiter's check of the flag
            drop(self.stop_signal.lock());
            self.stop_done.notify_all();
        }
    }
}

impl Default for TransportCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransportCoordinator {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::source::shared_source;
    use crate::{event_callback, MockSource, SampleBuffer};

    fn quick_stop() -> TransportConfig {
        TransportConfig {
            stop_timeout: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn pull(transport: &TransportCoordinator, frames: usize) -> Vec<f32> {
        let mut buffer = SampleBuffer::new(1, frames);
        transport.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        buffer.channel(0).to_vec()
    }

    fn count_events(transport: &TransportCoordinator, wanted: TransportEvent) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        transport.add_listener(event_callback(move |event| {
            if event == wanted {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        count
    }

    fn mono() -> SourceOptions {
        SourceOptions {
            max_channels: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_idle_transport_outputs_silence() {
        let transport = TransportCoordinator::new();
        let mut buffer = SampleBuffer::from_channels(vec![vec![1.0; 8]]);
        transport.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
        assert!(buffer.channel(0).iter().all(|&s| s == 0.0));
        assert_eq!(transport.state(), TransportState::Idle);

        transport.start();
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_gain_change_is_ramped_across_next_block() {
        let transport = TransportCoordinator::new();
        transport
            .set_source(Some(shared_source(MockSource::constant(1, 10_000, 1.0))), mono())
            .unwrap();
        transport.prepare_to_play(8, 48000.0);
        transport.start();

        assert_eq!(pull(&transport, 8), vec![1.0; 8]);

        transport.set_gain(0.5);
        let ramp = pull(&transport, 8);
        assert_eq!(ramp[0], 1.0);
        assert!(ramp.windows(2).all(|w| w[1] < w[0]));
        assert!(ramp.iter().all(|&s| s > 0.5));

        assert!(pull(&transport, 8).iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_end_of_stream_stops_with_one_notification() {
        let transport = TransportCoordinator::new();
        let finished = count_events(&transport, TransportEvent::StreamFinished);
        transport
            .set_source(Some(shared_source(MockSource::constant(1, 32, 1.0))), mono())
            .unwrap();
        transport.prepare_to_play(8, 48000.0);
        transport.start();

        for _ in 0..3 {
            assert_eq!(pull(&transport, 8), vec![1.0; 8]);
            assert!(transport.is_playing());
        }

        let last = pull(&transport, 8);
        assert!(!transport.is_playing());
        assert!(transport.has_stream_finished());
        assert_eq!(last[0], 1.0);
        assert!(last.windows(2).all(|w| w[1] < w[0]));

        assert_eq!(pull(&transport, 8), vec![0.0; 8]);
        assert_eq!(transport.state(), TransportState::Stopped);

        assert_eq!(transport.dispatch_pending_events(), 1);
        assert_eq!(transport.dispatch_pending_events(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_looping_source_never_finishes() {
        let transport = TransportCoordinator::new();
        let mut mock = MockSource::constant(1, 8, 1.0);
        mock.set_looping(true);
        transport.set_source(Some(shared_source(mock)), mono()).unwrap();
        transport.prepare_to_play(8, 48000.0);
        transport.start();

        for _ in 0..4 {
            assert_eq!(pull(&transport, 8), vec![1.0; 8]);
        }
        assert!(transport.is_playing());
        assert!(transport.is_looping());
    }

    #[test]
    fn test_reattaching_same_source_releases_once() {
        let mock = MockSource::ramp(1, 100);
        let counters = mock.counters();
        let source = shared_source(mock);
        let transport = TransportCoordinator::new();
        let changes = count_events(&transport, TransportEvent::SourceChanged);
        transport.prepare_to_play(16, 48000.0);

        transport.set_source(Some(source.clone()), mono()).unwrap();
        assert_eq!((counters.prepares(), counters.releases()), (1, 0));

        transport.set_source(Some(source.clone()), mono()).unwrap();
        assert_eq!((counters.prepares(), counters.releases()), (2, 1));

        transport.set_source(None, mono()).unwrap();
        transport.set_source(None, mono()).unwrap();
        assert_eq!((counters.prepares(), counters.releases()), (2, 2));
        assert_eq!(changes.load(Ordering::SeqCst), 4);
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_unprepared_chain_is_not_released() {
        let mock = MockSource::ramp(1, 100);
        let counters = mock.counters();
        let transport = TransportCoordinator::new();
        transport.set_source(Some(shared_source(mock)), mono()).unwrap();
        transport.set_source(None, mono()).unwrap();
        assert_eq!((counters.prepares(), counters.releases()), (0, 0));
    }

    #[test]
    fn test_read_ahead_requires_thread() {
        let transport = TransportCoordinator::new();
        let options = SourceOptions {
            read_ahead_size: 4096,
            ..Default::default()
        };
        let err = transport
            .set_source(Some(shared_source(MockSource::ramp(1, 10))), options)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingReadAheadThread { read_ahead_size: 4096 }
        ));
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_invalid_source_rate_is_rejected() {
        let transport = TransportCoordinator::new();
        let options = SourceOptions {
            source_sample_rate: f64::NAN,
            ..Default::default()
        };
        let err = transport
            .set_source(Some(shared_source(MockSource::ramp(1, 10))), options)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidSampleRate(_)));
    }

    #[test]
    fn test_positions_are_in_device_frames() {
        let source = shared_source(MockSource::ramp(1, 1000));
        let transport = TransportCoordinator::new();
        let options = SourceOptions {
            source_sample_rate: 24000.0,
            ..mono()
        };
        transport.set_source(Some(source.clone()), options).unwrap();
        transport.prepare_to_play(8, 48000.0);

        assert_eq!(transport.total_length(), 2000);
        transport.set_next_read_position(480);
        assert_eq!(source.lock().next_read_position(), 240);
        assert_eq!(transport.next_read_position(), 480);
        assert!((transport.current_position() - 0.01).abs() < 1e-9);
        assert!((transport.length_in_seconds() - 2000.0 / 48000.0).abs() < 1e-9);

        transport.set_position(0.5);
        assert_eq!(source.lock().next_read_position(), 12000);
    }

    #[test]
    fn test_seek_flushes_resampler() {
        let transport = TransportCoordinator::new();
        let options = SourceOptions {
            source_sample_rate: 24000.0,
            ..mono()
        };
        transport
            .set_source(Some(shared_source(MockSource::ramp(1, 1000))), options)
            .unwrap();
        transport.prepare_to_play(8, 48000.0);
        transport.start();

        assert_eq!(pull(&transport, 4), vec![0.0, 0.5, 1.0, 1.5]);
        transport.set_next_read_position(200);
        assert_eq!(pull(&transport, 3), vec![100.0, 100.5, 101.0]);
    }

    #[test]
    fn test_stop_without_callback_times_out() {
        let transport = TransportCoordinator::with_config(quick_stop());
        let stopped = count_events(&transport, TransportEvent::Stopped);
        transport
            .set_source(Some(shared_source(MockSource::ramp(1, 100))), mono())
            .unwrap();
        transport.start();
        transport.stop();

        assert!(!transport.is_playing());
        assert_eq!(transport.state(), TransportState::FadingOut);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);

        pull(&transport, 4);
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_stop_waits_for_fade_block() {
        let transport = Arc::new(TransportCoordinator::new());
        transport
            .set_source(Some(shared_source(MockSource::constant(1, 1_000_000, 1.0))), mono())
            .unwrap();
        transport.prepare_to_play(64, 48000.0);
        transport.start();

        let running = Arc::new(AtomicBool::new(true));
        let callback = {
            let transport = transport.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                let mut buffer = SampleBuffer::new(1, 64);
                while running.load(Ordering::SeqCst) {
                    transport.get_next_audio_block(&mut BlockRegion::whole(&mut buffer));
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };

        std::thread::sleep(Duration::from_millis(5));
        let begin = Instant::now();
        transport.stop();
        assert!(begin.elapsed() < Duration::from_millis(500));
        assert_eq!(transport.state(), TransportState::Stopped);

        running.store(false, Ordering::SeqCst);
        callback.join().unwrap();
    }

    #[test]
    fn test_stop_fade_length_follows_config() {
        let transport = TransportCoordinator::with_config(TransportConfig {
            fade_out_samples: 4,
            ..quick_stop()
        });
        transport
            .set_source(Some(shared_source(MockSource::constant(1, 1000, 1.0))), mono())
            .unwrap();
        transport.prepare_to_play(8, 48000.0);
        transport.start();
        pull(&transport, 8);
        transport.stop();

        assert_eq!(pull(&transport, 8), vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_watch_tracks_state() {
        let transport = TransportCoordinator::new();
        let rx = transport.subscribe();
        transport
            .set_source(Some(shared_source(MockSource::ramp(1, 100))), mono())
            .unwrap();
        assert_eq!(*rx.borrow(), TransportState::Stopped);
        transport.start();
        assert_eq!(*rx.borrow(), TransportState::Playing);
    }

    #[test]
    fn test_released_transport_outputs_silence() {
        let transport = TransportCoordinator::new();
        transport
            .set_source(
                Some(shared_source(MockSource::constant(1, 100_000, 1.0))),
                SourceOptions {
                    source_sample_rate: 44100.0,
                    ..mono()
                },
            )
            .unwrap();
        transport.prepare_to_play(64, 48000.0);
        transport.start();
        assert!(pull(&transport, 64).iter().any(|&s| s != 0.0));

        transport.release_resources();
        assert_eq!(pull(&transport, 64), vec![0.0; 64]);
        assert!(transport.is_playing());

        transport.prepare_to_play(64, 48000.0);
        assert!(pull(&transport, 64).iter().all(|&s| s != 0.0));
    }

    #[test]
    fn test_drop_releases_prepared_read_ahead_chain() {
        let thread = Arc::new(crate::TimeSliceThread::start("drop-release").unwrap());
        let mock = MockSource::ramp(1, 10_000);
        let counters = mock.counters();
        let transport = TransportCoordinator::new();
        transport
            .set_source(
                Some(shared_source(mock)),
                SourceOptions {
                    read_ahead_size: 1024,
                    read_ahead_thread: Some(thread.clone()),
                    ..mono()
                },
            )
            .unwrap();
        transport.prepare_to_play(64, 48000.0);
        assert_eq!(thread.num_clients(), 1);

        drop(transport);
        assert_eq!(counters.releases(), 1);
        assert_eq!(thread.num_clients(), 0);
    }
}
