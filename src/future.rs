//! Set-once completion signal for a subscription.
//!
//! A [`SubscriptionFuture`] is handed to the owner of a
//! [`Policy`](crate::policy::Policy) when it opens. It resolves exactly once:
//! with no error when the policy is closed, or with the [`StreamError`] that
//! ended the subscription. Both the close path and the receive loop may race
//! to resolve it; an atomic compare-and-set picks the winner and the loser is
//! told so through [`AlreadyResolved`].

use std::{
    fmt,
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::error::StreamError;

/// Error returned when waiting on a [`SubscriptionFuture`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FutureError {
    /// The future did not resolve within the requested timeout.
    #[error("timed out waiting for the subscription to finish")]
    Timeout,
    /// The subscription ended with a fatal stream error.
    #[error("subscription failed: {0}")]
    Stream(#[from] StreamError),
}

/// Returned by a second attempt to resolve a future.
#[must_use = "a failed resolution means another outcome was already recorded"]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("subscription future already resolved")]
pub struct AlreadyResolved;

type DoneCallback = Box<dyn FnOnce(&SubscriptionFuture) + Send>;

#[derive(Default)]
struct Slot {
    outcome: Option<Result<(), StreamError>>,
    callbacks: Vec<DoneCallback>,
}

#[derive(Default)]
struct Inner {
    resolved: AtomicBool,
    slot: Mutex<Slot>,
    ready: Condvar,
}

/// Shared, cloneable handle on the outcome of a subscription.
#[derive(Clone, Default)]
pub struct SubscriptionFuture(Arc<Inner>);

impl SubscriptionFuture {
    /// Create an unresolved future.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.0.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an outcome has been recorded.
    #[must_use]
    pub fn done(&self) -> bool { self.0.resolved.load(Ordering::Acquire) }

    /// Whether the subscription is still running.
    #[must_use]
    pub fn running(&self) -> bool { !self.done() }

    /// Whether `other` is a handle on the same future.
    #[must_use]
    pub fn same_as(&self, other: &SubscriptionFuture) -> bool { Arc::ptr_eq(&self.0, &other.0) }

    /// Wait for the outcome.
    ///
    /// Blocks the calling thread until the future resolves or `timeout`
    /// elapses. `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`FutureError::Stream`] if the subscription failed and
    /// [`FutureError::Timeout`] if it is still running when the timeout
    /// expires.
    pub fn result(&self, timeout: Option<Duration>) -> Result<(), FutureError> {
        match self.wait(timeout)? {
            Ok(()) => Ok(()),
            Err(error) => Err(FutureError::Stream(error)),
        }
    }

    /// Wait for the outcome and return the failure, if any.
    ///
    /// # Errors
    ///
    /// Returns [`FutureError::Timeout`] if the future is unresolved when the
    /// timeout expires.
    pub fn exception(&self, timeout: Option<Duration>) -> Result<Option<StreamError>, FutureError> {
        Ok(self.wait(timeout)?.err())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Result<(), StreamError>, FutureError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot();
        loop {
            if let Some(outcome) = &slot.outcome {
                return Ok(outcome.clone());
            }
            slot = match deadline {
                None => self.0.ready.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(FutureError::Timeout);
                    }
                    self.0
                        .ready
                        .wait_timeout(slot, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Run `callback` once the future resolves.
    ///
    /// Runs immediately on the calling thread if the future is already
    /// resolved, otherwise on the thread that resolves it.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&SubscriptionFuture) + Send + 'static,
    {
        let mut slot = self.slot();
        if slot.outcome.is_some() {
            drop(slot);
            callback(self);
        } else {
            slot.callbacks.push(Box::new(callback));
        }
    }

    /// Resolve the future successfully.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyResolved`] if an outcome was recorded earlier; that
    /// outcome is left untouched.
    pub fn set_result(&self) -> Result<(), AlreadyResolved> { self.resolve(Ok(())) }

    /// Resolve the future with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyResolved`] if an outcome was recorded earlier; that
    /// outcome is left untouched.
    pub fn set_exception(&self, error: StreamError) -> Result<(), AlreadyResolved> {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Result<(), StreamError>) -> Result<(), AlreadyResolved> {
        if self
            .0
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AlreadyResolved);
        }
        let callbacks = {
            let mut slot = self.slot();
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.callbacks)
        };
        self.0.ready.notify_all();
        for callback in callbacks {
            callback(self);
        }
        Ok(())
    }
}

impl PartialEq for SubscriptionFuture {
    fn eq(&self, other: &Self) -> bool { self.same_as(other) }
}

impl Eq for SubscriptionFuture {}

impl fmt::Debug for SubscriptionFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionFuture")
            .field("outcome", &self.slot().outcome)
            .finish_non_exhaustive()
    }
}
