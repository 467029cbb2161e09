//! Background thread that shares its time between read-ahead clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Longest sleep when no client is due, so a missed wake-up is bounded.
const MAX_IDLE_WAIT: Duration = Duration::from_millis(500);

/// A task that is periodically given a slice of a background thread.
pub trait TimeSliceClient: Send + Sync {
    /// Does a bounded amount of work.
    ///
    /// Returns how long to wait before the next slice, or `None` to be
    /// removed from the thread.
    fn use_time_slice(&self) -> Option<Duration>;
}

/// The scheduler a read-ahead layer registers with.
///
/// This is passed into the transport explicitly rather than reached through
/// a global, so tests can drive read-ahead fills by hand.
pub trait ReadAheadScheduler: Send + Sync {
    /// Registers a client; it receives its first slice as soon as possible.
    fn add_client(&self, client: Arc<dyn TimeSliceClient>);

    /// Unregisters a client. Once this returns the client is not running
    /// and will not be called again.
    fn remove_client(&self, client: &Arc<dyn TimeSliceClient>);

    /// Asks for every client to be serviced soon.
    ///
    /// Called from the audio thread, so implementations must not block.
    fn notify(&self);
}

fn same_client(a: &Arc<dyn TimeSliceClient>, b: &Arc<dyn TimeSliceClient>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct Entry {
    client: Arc<dyn TimeSliceClient>,
    next_due: Instant,
}

struct State {
    clients: Vec<Entry>,
    next_index: usize,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    wake_pending: AtomicBool,
    /// Held while a client's slice runs, so removal can wait it out.
    slice_lock: Mutex<()>,
}

/// A named OS thread serving [`TimeSliceClient`]s round-robin.
///
/// The thread sleeps until the earliest client is due or it is notified.
/// Dropping the handle stops and joins the thread.
///
/// # Example
///
/// ```
/// use stream_transport::TimeSliceThread;
///
/// let thread = TimeSliceThread::start("read-ahead")?;
/// assert_eq!(thread.num_clients(), 0);
/// thread.stop();
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct TimeSliceThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl TimeSliceThread {
    /// Spawns the thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn start(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                clients: Vec::new(),
                next_index: 0,
                running: true,
            }),
            wake: Condvar::new(),
            wake_pending: AtomicBool::new(false),
            slice_lock: Mutex::new(()),
        });

        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker))?;

        tracing::debug!(thread = name, "Time-slice thread started");

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            name: name.to_string(),
        })
    }

    /// Returns the thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of registered clients.
    pub fn num_clients(&self) -> usize {
        self.shared.state.lock().clients.len()
    }

    /// Stops the thread and waits for it to exit. Idempotent.
    pub fn stop(&self) {
        self.shared.state.lock().running = false;
        self.shared.wake.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!(thread = %self.name, "Time-slice thread panicked");
            } else {
                tracing::debug!(thread = %self.name, "Time-slice thread stopped");
            }
        }
    }
}

impl Drop for TimeSliceThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ReadAheadScheduler for TimeSliceThread {
    fn add_client(&self, client: Arc<dyn TimeSliceClient>) {
        let mut state = self.shared.state.lock();
        if !state.clients.iter().any(|e| same_client(&e.client, &client)) {
            state.clients.push(Entry {
                client,
                next_due: Instant::now(),
            });
        }
        drop(state);
        self.shared.wake.notify_all();
    }

    fn remove_client(&self, client: &Arc<dyn TimeSliceClient>) {
        self.shared
            .state
            .lock()
            .clients
            .retain(|e| !same_client(&e.client, client));
        // wait for a slice that may be running right now
        drop(self.shared.slice_lock.lock());
    }

    fn notify(&self) {
        self.shared.wake_pending.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

fn run(shared: &Shared) {
    loop {
        let (client, slice_guard) = {
            let mut state = shared.state.lock();
            loop {
                if !state.running {
                    return;
                }

                let now = Instant::now();
                if shared.wake_pending.swap(false, Ordering::Acquire) {
                    for entry in &mut state.clients {
                        entry.next_due = now;
                    }
                }

                if let Some(index) = next_due_client(&state, now) {
                    state.next_index = index + 1;
                    let client = Arc::clone(&state.clients[index].client);
                    // taken before the state lock is released so that
                    // remove_client cannot slip in between
                    break (client, shared.slice_lock.lock());
                }

                let deadline = state
                    .clients
                    .iter()
                    .map(|e| e.next_due)
                    .min()
                    .map_or(now + MAX_IDLE_WAIT, |due| due.min(now + MAX_IDLE_WAIT));
                shared.wake.wait_until(&mut state, deadline);
            }
        };

        let next = client.use_time_slice();
        drop(slice_guard);

        let mut state = shared.state.lock();
        if let Some(position) = state
            .clients
            .iter()
            .position(|e| same_client(&e.client, &client))
        {
            match next {
                Some(wait) => state.clients[position].next_due = Instant::now() + wait,
                None => {
                    state.clients.remove(position);
                }
            }
        }
    }
}

fn next_due_client(state: &State, now: Instant) -> Option<usize> {
    let count = state.clients.len();
    (0..count)
        .map(|offset| (state.next_index + offset) % count)
        .find(|&i| state.clients[i].next_due <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        calls: AtomicUsize,
        limit: usize,
    }

    impl TimeSliceClient for Counter {
        fn use_time_slice(&self) -> Option<Duration> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (calls < self.limit).then_some(Duration::ZERO)
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_client_runs_until_it_asks_to_leave() {
        let thread = TimeSliceThread::start("test-slices").unwrap();
        let counter = Arc::new(Counter {
            calls: AtomicUsize::new(0),
            limit: 5,
        });
        thread.add_client(counter.clone());

        assert!(wait_for(|| thread.num_clients() == 0));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_removed_client_is_not_called_again() {
        let thread = TimeSliceThread::start("test-remove").unwrap();
        let counter = Arc::new(Counter {
            calls: AtomicUsize::new(0),
            limit: usize::MAX,
        });
        let client: Arc<dyn TimeSliceClient> = counter.clone();
        thread.add_client(Arc::clone(&client));
        assert!(wait_for(|| counter.calls.load(Ordering::SeqCst) > 3));

        thread.remove_client(&client);
        let calls = counter.calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.calls.load(Ordering::SeqCst), calls);
        assert_eq!(thread.num_clients(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let thread = TimeSliceThread::start("test-stop").unwrap();
        assert_eq!(thread.name(), "test-stop");
        thread.stop();
        thread.stop();
    }
}
