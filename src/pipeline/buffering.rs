//! Read-ahead layer that decouples a slow source from the audio callback.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::ring_buffer::CircularAudioBuffer;
use super::time_slice::{ReadAheadScheduler, TimeSliceClient};
use crate::config::ReadAheadConfig;
use crate::source::{AudioSource, PositionableSource, SharedSource};
use crate::{BlockRegion, SampleBuffer};

/// Share of a second pre-filled synchronously by `prepare_to_play`.
const PREFILL_SECONDS: f64 = 0.25;

/// Buffer state shared by the audio callback and the fill thread.
#[derive(Debug)]
struct BufferState {
    ring: Option<CircularAudioBuffer>,
    /// Source position of the next frame handed to the callback.
    next_play_pos: i64,
    /// Ring index at which the current fill segment begins.
    segment_start_ring: i64,
    /// Source position stored at `segment_start_ring`.
    segment_source_pos: i64,
    /// Bumped by every seek that restarts the segment.
    generation: u64,
}

impl BufferState {
    /// Source positions currently held in the ring, as `[start, end)`.
    fn buffered_range(&self) -> (i64, i64) {
        let Some(ring) = &self.ring else {
            return (self.next_play_pos, self.next_play_pos);
        };
        let written = ring.write_index() - self.segment_start_ring;
        let end = self.segment_source_pos + written;
        let start = end - written.min(ring.capacity() as i64);
        (start, end)
    }

    fn restart_segment(&mut self, position: i64) {
        self.segment_start_ring = self.ring.as_ref().map_or(0, CircularAudioBuffer::write_index);
        self.segment_source_pos = position;
        self.generation += 1;
    }
}

/// Outcome of one fill step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// Frames were added to the ring.
    Loaded(usize),
    /// A seek raced the read and the chunk was dropped.
    Discarded,
    /// The ring is full, unprepared, or the source is exhausted.
    Idle,
}

/// The half of the read-ahead layer owned jointly with the fill thread.
struct ReadAhead {
    source: SharedSource,
    state: Mutex<BufferState>,
    /// Fill staging buffer; only the fill path touches it.
    scratch: Mutex<SampleBuffer>,
    /// Cached so the audio thread never locks the source.
    total_length: AtomicI64,
    looping: AtomicBool,
    config: ReadAheadConfig,
}

impl ReadAhead {
    fn refresh_source_info(&self) {
        let source = self.source.lock();
        self.total_length.store(source.total_length(), Ordering::Release);
        self.looping.store(source.is_looping(), Ordering::Release);
    }

    fn wrap(&self, position: i64) -> i64 {
        let total = self.total_length.load(Ordering::Acquire);
        if self.looping.load(Ordering::Acquire) && total > 0 {
            position.rem_euclid(total)
        } else {
            position
        }
    }

    fn fill(&self) -> Fill {
        let (read_from, frames, generation) = {
            let mut state = self.state.lock();
            let Some(capacity) = state.ring.as_ref().map(CircularAudioBuffer::capacity) else {
                return Fill::Idle;
            };

            let (start, end) = state.buffered_range();
            let play = state.next_play_pos;
            if play < start || play > end {
                // playback outran the fill
                state.restart_segment(play);
            }
            let (_, end) = state.buffered_range();

            let room = capacity as i64 - (end - state.next_play_pos);
            let chunk = self.config.fill_chunk_frames.min(capacity) as i64;
            let mut frames = room.min(chunk);
            if !self.looping.load(Ordering::Acquire) {
                frames = frames.min(self.total_length.load(Ordering::Acquire) - end);
            }
            if frames <= 0 {
                return Fill::Idle;
            }
            (end, frames as usize, state.generation)
        };

        let mut scratch = self.scratch.lock();
        if scratch.num_frames() < frames {
            return Fill::Idle;
        }
        {
            let mut source = self.source.lock();
            let wanted = self.wrap(read_from);
            if source.next_read_position() != wanted {
                source.set_next_read_position(wanted);
            }
            source.get_next_audio_block(&mut BlockRegion::new(&mut scratch, 0, frames));
            self.total_length.store(source.total_length(), Ordering::Release);
            self.looping.store(source.is_looping(), Ordering::Release);
        }

        let mut state = self.state.lock();
        if state.generation != generation {
            return Fill::Discarded;
        }
        match state.ring.as_mut() {
            Some(ring) => {
                ring.push_region(&scratch, 0, frames);
                Fill::Loaded(frames)
            }
            None => Fill::Idle,
        }
    }
}

impl TimeSliceClient for ReadAhead {
    fn use_time_slice(&self) -> Option<Duration> {
        match self.fill() {
            Fill::Loaded(_) | Fill::Discarded => Some(self.config.busy_wait),
            Fill::Idle => Some(self.config.idle_wait),
        }
    }
}

/// Wraps a positionable source with a read-ahead ring filled on a
/// background thread.
///
/// The audio callback only copies from the ring; reading the wrapped source
/// happens on the [`ReadAheadScheduler`]'s thread. Frames the fill has not
/// reached yet are played as silence. Seeking inside the buffered range
/// keeps the buffered audio; seeking outside it starts a new fill segment.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_transport::{
///     shared_source, AudioSource, BufferingSource, MockSource, PositionableSource,
///     ReadAheadConfig, TimeSliceThread,
/// };
///
/// let thread = Arc::new(TimeSliceThread::start("read-ahead")?);
/// let mut buffering = BufferingSource::new(
///     shared_source(MockSource::ramp(2, 48000)),
///     thread,
///     8192,
///     2,
///     ReadAheadConfig::default(),
/// );
/// buffering.prepare_to_play(512, 48000.0);
/// assert!(buffering.buffered_frames() > 0);
/// buffering.release_resources();
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct BufferingSource {
    read_ahead: Arc<ReadAhead>,
    scheduler: Arc<dyn ReadAheadScheduler>,
    registered: Option<Arc<dyn TimeSliceClient>>,
    read_ahead_size: usize,
    channels: usize,
}

impl BufferingSource {
    /// Creates a read-ahead layer of `read_ahead_size` frames over `source`.
    ///
    /// Nothing is allocated or registered until `prepare_to_play`.
    pub fn new(
        source: SharedSource,
        scheduler: Arc<dyn ReadAheadScheduler>,
        read_ahead_size: usize,
        channels: usize,
        config: ReadAheadConfig,
    ) -> Self {
        let read_ahead = ReadAhead {
            source,
            state: Mutex::new(BufferState {
                ring: None,
                next_play_pos: 0,
                segment_start_ring: 0,
                segment_source_pos: 0,
                generation: 0,
            }),
            scratch: Mutex::new(SampleBuffer::default()),
            total_length: AtomicI64::new(0),
            looping: AtomicBool::new(false),
            config,
        };
        read_ahead.refresh_source_info();

        Self {
            read_ahead: Arc::new(read_ahead),
            scheduler,
            registered: None,
            read_ahead_size,
            channels,
        }
    }

    /// Returns the wrapped source.
    pub fn source(&self) -> &SharedSource {
        &self.read_ahead.source
    }

    /// Returns how many frames from the play position on are already loaded.
    pub fn buffered_frames(&self) -> usize {
        let state = self.read_ahead.state.lock();
        let (start, end) = state.buffered_range();
        if state.next_play_pos < start {
            return 0;
        }
        (end - state.next_play_pos).max(0) as usize
    }

    /// Returns the time-slice client that fills this buffer.
    ///
    /// Schedulers driven by hand call `use_time_slice` on it directly.
    pub fn client(&self) -> Arc<dyn TimeSliceClient> {
        Arc::clone(&self.read_ahead) as Arc<dyn TimeSliceClient>
    }

    fn prefill(&self, target: usize) {
        while self.buffered_frames() < target {
            if self.read_ahead.fill() == Fill::Idle {
                break;
            }
        }
    }
}

impl AudioSource for BufferingSource {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: f64) {
        self.read_ahead
            .source
            .lock()
            .prepare_to_play(block_size, sample_rate);
        self.read_ahead.refresh_source_info();

        let capacity = self.read_ahead_size.max(block_size * 2).max(1);
        let chunk = self.read_ahead.config.fill_chunk_frames.min(capacity);
        self.read_ahead.scratch.lock().set_size(self.channels, chunk);
        {
            let mut state = self.read_ahead.state.lock();
            state.ring = Some(CircularAudioBuffer::new(self.channels, capacity));
            let position = state.next_play_pos;
            state.restart_segment(position);
        }

        let target = ((sample_rate * PREFILL_SECONDS) as usize).min(capacity / 2);
        self.prefill(target);

        if self.registered.is_none() {
            let client = self.client();
            self.scheduler.add_client(Arc::clone(&client));
            self.registered = Some(client);
        }

        tracing::debug!(
            capacity,
            channels = self.channels,
            prefilled = self.buffered_frames(),
            "Read-ahead buffer prepared"
        );
    }

    fn release_resources(&mut self) {
        if let Some(client) = self.registered.take() {
            self.scheduler.remove_client(&client);
        }
        self.read_ahead.state.lock().ring = None;
        *self.read_ahead.scratch.lock() = SampleBuffer::default();
        self.read_ahead.source.lock().release_resources();
    }

    fn get_next_audio_block(&mut self, region: &mut BlockRegion<'_>) {
        {
            let mut state = self.read_ahead.state.lock();
            let play = state.next_play_pos;
            let len = region.len as i64;
            let (start, end) = state.buffered_range();
            let from = play.max(start);
            let to = (play + len).min(end);

            match state.ring.as_ref() {
                Some(ring) if from < to => {
                    let offset = (from - play) as usize;
                    let count = (to - from) as usize;
                    let ring_index = state.segment_start_ring + (from - state.segment_source_pos);

                    region.sub_region(0, offset).clear();
                    let after = offset + count;
                    region.sub_region(after, region.len - after).clear();
                    ring.read(ring_index, region.buffer, region.start + offset, count);
                }
                _ => region.clear(),
            }

            state.next_play_pos = play + len;
        }
        self.scheduler.notify();
    }
}

impl PositionableSource for BufferingSource {
    fn set_next_read_position(&mut self, position: i64) {
        let position = self.read_ahead.wrap(position);
        let mut state = self.read_ahead.state.lock();
        let (start, end) = state.buffered_range();
        if position < start || position >= end {
            state.restart_segment(position);
        }
        state.next_play_pos = position;
        drop(state);
        self.scheduler.notify();
    }

    fn next_read_position(&self) -> i64 {
        let position = self.read_ahead.state.lock().next_play_pos;
        self.read_ahead.wrap(position)
    }

    fn total_length(&self) -> i64 {
        self.read_ahead.total_length.load(Ordering::Acquire)
    }

    fn is_looping(&self) -> bool {
        self.read_ahead.looping.load(Ordering::Acquire)
    }

    fn set_looping(&mut self, should_loop: bool) {
        self.read_ahead.source.lock().set_looping(should_loop);
        self.read_ahead.refresh_source_info();
    }
}

impl Drop for BufferingSource {
    fn drop(&mut self) {
        if let Some(client) = self.registered.take() {
            self.scheduler.remove_client(&client);
        }
    }
}
