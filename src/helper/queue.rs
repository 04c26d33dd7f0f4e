//! Unbounded FIFO feeding a helper thread.
//!
//! Producers hold cloneable [`RequestSender`]s and never block. The single
//! consumer is the helper thread started by the
//! [`HelperThreadRegistry`](super::HelperThreadRegistry), which dequeues with
//! a blocking receive on its own OS thread.

use std::fmt;

use tokio::sync::mpsc;

use super::QueueClosed;

/// Item travelling through a [`RequestQueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Job<T> {
    /// Work for the handler.
    Run(T),
    /// Sentinel asking the worker to exit.
    Stop,
}

/// Paired sender and receiver for a helper thread.
pub struct RequestQueue<T> {
    tx: mpsc::UnboundedSender<Job<T>>,
    rx: mpsc::UnboundedReceiver<Job<T>>,
}

impl<T: Send + 'static> RequestQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Return a producer handle for this queue.
    #[must_use]
    pub fn sender(&self) -> RequestSender<T> { RequestSender(self.tx.clone()) }

    pub(crate) fn into_parts(self) -> (RequestSender<T>, RequestReceiver<T>) {
        (RequestSender(self.tx), RequestReceiver(self.rx))
    }
}

impl<T: Send + 'static> Default for RequestQueue<T> {
    fn default() -> Self { Self::new() }
}

impl<T> fmt::Debug for RequestQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

/// Cloneable producer side of a [`RequestQueue`].
pub struct RequestSender<T>(mpsc::UnboundedSender<Job<T>>);

impl<T> Clone for RequestSender<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> fmt::Debug for RequestSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestSender")
            .field(&self.0.is_closed())
            .finish()
    }
}

impl<T> RequestSender<T> {
    /// Enqueue `item` for the worker.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] once the worker has exited and dropped its
    /// receiver.
    pub fn send(&self, item: T) -> Result<(), QueueClosed> {
        self.0.send(Job::Run(item)).map_err(|_| QueueClosed)
    }

    /// Whether the worker side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.is_closed() }

    /// Enqueue the stop sentinel. Returns `false` if the worker already exited.
    pub(crate) fn stop(&self) -> bool { self.0.send(Job::Stop).is_ok() }
}

/// Consumer side, owned by exactly one helper thread.
pub(crate) struct RequestReceiver<T>(mpsc::UnboundedReceiver<Job<T>>);

impl<T> RequestReceiver<T> {
    /// Block the current OS thread until the next job arrives.
    ///
    /// Returns `None` once every sender has been dropped. Must not be called
    /// from within an async runtime.
    pub(crate) fn recv_blocking(&mut self) -> Option<Job<T>> { self.0.blocking_recv() }
}
