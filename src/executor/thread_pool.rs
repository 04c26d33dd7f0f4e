//! Default bounded executor backed by a Tokio blocking pool.

use std::{fmt, sync::Arc};

use log::debug;
use tokio::{
    runtime::{self, Runtime},
    sync::Semaphore,
};
use tokio_util::sync::CancellationToken;

use super::{CallbackExecutor, CompletionHandle, ExecutorError, MessageCallback, invoke};
use crate::message::Message;

/// Runs callbacks on at most `workers` threads.
///
/// At most `queue_bound` callbacks may be admitted but unfinished; beyond
/// that [`submit`](CallbackExecutor::submit) blocks the caller until a slot
/// frees up, which in turn stalls the receive loop.
/// [`submit_until`](CallbackExecutor::submit_until) bounds that wait with a
/// cancellation token, so one pool can be shared by several policies.
pub struct ThreadPoolExecutor {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ThreadPoolExecutor {
    /// Build a pool with `workers` threads admitting up to `queue_bound`
    /// callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Start`] if the runtime cannot be created.
    pub fn new(workers: usize, queue_bound: usize) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("pullstream-callback")
            .build()
            .map_err(ExecutorError::Start)?;
        Ok(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(queue_bound.max(workers))),
            workers,
        })
    }

    /// Number of callback threads.
    #[must_use]
    pub fn workers(&self) -> usize { self.workers }

    /// Callbacks that may still be admitted without blocking.
    #[must_use]
    pub fn available(&self) -> usize { self.permits.available_permits() }
}

impl CallbackExecutor for ThreadPoolExecutor {
    fn submit(
        &self,
        callback: MessageCallback,
        message: Message,
    ) -> Result<CompletionHandle, ExecutorError> {
        self.submit_until(callback, message, &CancellationToken::new())
    }

    fn submit_until(
        &self,
        callback: MessageCallback,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<CompletionHandle, ExecutorError> {
        let runtime = self.runtime.as_ref().ok_or(ExecutorError::Shutdown)?;
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = futures::executor::block_on(async {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ExecutorError::Cancelled),
                permit = acquire => permit.map_err(|_| ExecutorError::Shutdown),
            }
        })?;
        let handle = CompletionHandle::pending();
        let completion = handle.clone();
        runtime.spawn_blocking(move || {
            let outcome = invoke(&callback, message);
            drop(permit);
            completion.complete(outcome);
        });
        Ok(handle)
    }

    fn shutdown(&self) {
        if !self.permits.is_closed() {
            debug!("callback executor shutting down");
            self.permits.close();
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.permits.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        executor::{CallbackError, callback},
        helper::RequestQueue,
        types::{PubsubMessage, ReceivedMessage},
    };

    fn message(id: &str) -> Message {
        let queue = RequestQueue::new();
        Message::new(
            ReceivedMessage::new(id, PubsubMessage::new("payload", id)),
            queue.sender(),
        )
    }

    fn wait_done(handle: &CompletionHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_done() {
            assert!(Instant::now() < deadline, "callback did not complete");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn runs_callback_on_pool_thread() {
        let executor = ThreadPoolExecutor::new(2, 4).expect("executor");
        let (tx, rx) = mpsc::channel();
        let callback = callback(move |message| {
            let name = std::thread::current().name().map(str::to_owned);
            tx.send((message.lease_id().to_owned(), name))?;
            Ok(())
        });
        let handle = executor.submit(callback, message("a")).expect("submit");
        let (id, thread) = rx.recv_timeout(Duration::from_secs(5)).expect("callback ran");
        assert_eq!(id, "a");
        assert_eq!(thread.as_deref(), Some("pullstream-callback"));
        wait_done(&handle);
        assert!(matches!(handle.outcome(), Some(Ok(()))));
    }

    #[test]
    fn panics_become_callback_errors() {
        let executor = ThreadPoolExecutor::new(1, 1).expect("executor");
        let callback = callback(|_| panic!("callback blew up"));
        let handle = executor.submit(callback, message("p")).expect("submit");
        wait_done(&handle);
        let Some(Err(error)) = handle.outcome() else {
            panic!("callback should have failed");
        };
        assert!(matches!(
            error.as_ref(),
            CallbackError::Panicked(text) if text == "callback blew up"
        ));
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let executor = ThreadPoolExecutor::new(1, 1).expect("executor");
        executor.shutdown();
        let callback = callback(|_| Ok(()));
        assert!(matches!(
            executor.submit(callback, message("late")),
            Err(ExecutorError::Shutdown)
        ));
    }

    #[test]
    fn cancelled_admission_returns_without_a_slot() {
        let executor = ThreadPoolExecutor::new(1, 1).expect("executor");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let blocking = callback(move |_| {
            let _ = release_rx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .recv();
            Ok(())
        });
        let held = executor.submit(blocking, message("held")).expect("submit");
        assert_eq!(executor.available(), 0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let refused = executor.submit_until(callback(|_| Ok(())), message("late"), &cancel);
        assert!(matches!(refused, Err(ExecutorError::Cancelled)));

        release_tx.send(()).expect("release");
        wait_done(&held);
    }
}
