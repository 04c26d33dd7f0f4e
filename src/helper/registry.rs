//! Registry of named helper threads.
//!
//! Each entry pairs a [`RequestQueue`] with a handler. Once started, the
//! worker thread drains its queue until it dequeues the stop sentinel or all
//! producers are gone. Handler errors and panics are logged and the loop
//! carries on, so one malformed request cannot take the worker down.

use std::{
    fmt,
    io,
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, error, warn};

use super::{
    RegistryError,
    queue::{Job, RequestQueue, RequestReceiver},
};
use crate::panic::{self, format_panic};

/// Default bound on how long [`HelperThreadRegistry::stop`] waits for a
/// worker to exit.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// Interval between liveness checks while joining with a timeout.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(2);

type Launcher = Box<dyn FnOnce(&str) -> io::Result<JoinHandle<()>> + Send>;

struct HelperThread {
    signal_stop: Box<dyn Fn() -> bool + Send + Sync>,
    launcher: Mutex<Option<Launcher>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Concurrent registry of helper threads keyed by name.
///
/// The registry is owned by a single consumer; its lifetime bounds the
/// lifetime of the threads it started. Dropping it stops every worker.
pub struct HelperThreadRegistry {
    workers: DashMap<String, HelperThread>,
    join_timeout: Duration,
}

impl HelperThreadRegistry {
    /// Create an empty registry using [`DEFAULT_JOIN_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self { Self::with_join_timeout(DEFAULT_JOIN_TIMEOUT) }

    /// Create an empty registry with a custom join timeout.
    #[must_use]
    pub fn with_join_timeout(join_timeout: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            join_timeout,
        }
    }

    /// Register a worker draining `queue` into `handler`.
    ///
    /// The thread is not spawned until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `name` is already registered.
    pub fn register<T, H, E>(
        &self,
        name: impl Into<String>,
        queue: RequestQueue<T>,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        T: Send + 'static,
        H: FnMut(T) -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        match self.workers.entry(name.into()) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (sender, receiver) = queue.into_parts();
                let launcher: Launcher = Box::new(move |name: &str| {
                    let worker = name.to_owned();
                    thread::Builder::new()
                        .name(worker.clone())
                        .spawn(move || run_worker(&worker, receiver, handler))
                });
                entry.insert(HelperThread {
                    signal_stop: Box::new(move || sender.stop()),
                    launcher: Mutex::new(Some(launcher)),
                    handle: Mutex::new(None),
                });
                Ok(())
            }
        }
    }

    /// Spawn every registered worker that has not been started yet.
    ///
    /// Returns the number of threads spawned.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Spawn`] if a thread cannot be created. Workers
    /// spawned before the failure keep running.
    pub fn start(&self) -> Result<usize, RegistryError> {
        let mut started = 0;
        for worker in self.workers.iter() {
            let launcher = worker
                .launcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(launch) = launcher else { continue };
            let handle = launch(worker.key()).map_err(|source| RegistryError::Spawn {
                name: worker.key().clone(),
                source,
            })?;
            *worker.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            debug!("helper thread started: name={}", worker.key());
            started += 1;
        }
        Ok(started)
    }

    /// Stop the worker registered as `name`.
    ///
    /// The entry is removed before the stop sentinel is queued, so
    /// [`contains`](Self::contains) reports it gone even while the join is
    /// pending. The join is bounded by the registry's timeout and skipped when
    /// called from the worker itself. Returns `false` if no such worker exists.
    pub fn stop(&self, name: &str) -> bool {
        let Some((name, worker)) = self.workers.remove(name) else {
            return false;
        };
        if !(worker.signal_stop)() {
            debug!("helper thread already exited: name={name}");
        }
        let handle = worker
            .handle
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handle {
            join_with_timeout(&name, handle, self.join_timeout);
        }
        true
    }

    /// Stop every registered worker.
    pub fn stop_all(&self) {
        for name in self.names() {
            self.stop(&name);
        }
    }

    /// Whether a worker called `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.workers.contains_key(name) }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize { self.workers.len() }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.workers.is_empty() }

    /// Names of the registered workers, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.key().clone()).collect()
    }

    /// Timeout applied when joining stopped workers.
    #[must_use]
    pub fn join_timeout(&self) -> Duration { self.join_timeout }
}

impl Default for HelperThreadRegistry {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for HelperThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperThreadRegistry")
            .field("workers", &self.names())
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

impl Drop for HelperThreadRegistry {
    fn drop(&mut self) { self.stop_all(); }
}

fn run_worker<T, H, E>(name: &str, mut receiver: RequestReceiver<T>, mut handler: H)
where
    H: FnMut(T) -> Result<(), E>,
    E: fmt::Display,
{
    while let Some(job) = receiver.recv_blocking() {
        let item = match job {
            Job::Run(item) => item,
            Job::Stop => break,
        };
        match panic::catch(|| handler(item)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("error in helper thread handler: name={name}, error={e}"),
            Err(panic) => {
                tracing::error!(panic = %panic, worker = name, "helper thread handler panicked");
            }
        }
    }
    debug!("helper thread exiting: name={name}");
}

/// Join `handle`, giving up after `timeout`.
///
/// Joining the current thread is skipped. A thread still running when the
/// timeout elapses is detached and a warning is logged.
pub(crate) fn join_with_timeout(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    if handle.thread().id() == thread::current().id() {
        debug!("skipping self-join: name={name}");
        return;
    }
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("thread did not stop in time; detaching: name={name}, timeout={timeout:?}");
            return;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if let Err(panic) = handle.join() {
        error!("thread panicked: name={name}, panic={}", format_panic(panic));
    }
}
