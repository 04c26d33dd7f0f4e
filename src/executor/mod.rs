//! Worker pools that run subscriber callbacks.
//!
//! The policy hands every delivered [`Message`] to a [`CallbackExecutor`]
//! together with the user callback. `submit` returns at once with a
//! [`CompletionHandle`]; the callback runs later on a pool thread and its
//! outcome is published through the handle.

mod handle;
mod thread_pool;

use std::{error::Error, io, sync::Arc};

pub use handle::CompletionHandle;
use thiserror::Error;
pub use thread_pool::ThreadPoolExecutor;
use tokio_util::sync::CancellationToken;

use crate::{message::Message, panic};

/// Boxed error a callback may return.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// User code invoked once per delivered message.
pub type MessageCallback = Arc<dyn Fn(Message) -> Result<(), BoxError> + Send + Sync>;

/// Wrap a closure as a [`MessageCallback`].
pub fn callback<F>(f: F) -> MessageCallback
where
    F: Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// How a callback failed.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback failed: {0}")]
    Failed(BoxError),
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Errors raised when submitting work.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor no longer accepts work.
    #[error("executor is shut down")]
    Shutdown,
    /// The caller stopped waiting for a free slot.
    #[error("admission cancelled")]
    Cancelled,
    /// The worker pool could not be created.
    #[error("failed to start executor: {0}")]
    Start(#[source] io::Error),
}

/// A pool on which callbacks run.
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Schedule `callback(message)`.
    ///
    /// May block while the pool is saturated but never waits for the
    /// callback itself.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Shutdown`] once the executor has stopped
    /// accepting work.
    fn submit(
        &self,
        callback: MessageCallback,
        message: Message,
    ) -> Result<CompletionHandle, ExecutorError>;

    /// Like [`submit`](Self::submit), but stops waiting for admission once
    /// `cancel` fires.
    ///
    /// Executors whose `submit` can block should override this; the default
    /// ignores `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Cancelled`] if `cancel` fired first, or
    /// [`ExecutorError::Shutdown`] as for `submit`.
    fn submit_until(
        &self,
        callback: MessageCallback,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<CompletionHandle, ExecutorError> {
        let _ = cancel;
        self.submit(callback, message)
    }

    /// Stop accepting new work. Callbacks already running are not interrupted.
    ///
    /// A policy only calls this on an executor it created itself.
    fn shutdown(&self) {}
}

/// Run `callback` on the current thread, containing panics.
///
/// # Errors
///
/// Returns [`CallbackError`] if the callback failed or panicked.
pub fn invoke(callback: &MessageCallback, message: Message) -> Result<(), CallbackError> {
    match panic::catch(|| callback(message)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(CallbackError::Failed(error)),
        Err(panic) => Err(CallbackError::Panicked(panic.to_string())),
    }
}
