//! Completion handle for a submitted callback.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::CallbackError;

type Observer = Box<dyn FnOnce(&CompletionHandle) + Send>;

#[derive(Default)]
struct HandleState {
    outcome: Option<Result<(), Arc<CallbackError>>>,
    observers: Vec<Observer>,
}

/// Shared handle on the outcome of one callback.
///
/// Completed exactly once by the executor. Observers attached with
/// [`on_completion`](Self::on_completion) run on the completing thread, or
/// immediately when attached after completion.
#[derive(Clone, Default)]
pub struct CompletionHandle(Arc<Mutex<HandleState>>);

impl CompletionHandle {
    /// Create a handle that has not completed yet.
    #[must_use]
    pub fn pending() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the callback outcome and notify observers.
    ///
    /// Returns `false`, leaving the first outcome in place, if the handle was
    /// already complete.
    pub fn complete(&self, outcome: Result<(), CallbackError>) -> bool {
        let observers = {
            let mut state = self.state();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.map_err(Arc::new));
            std::mem::take(&mut state.observers)
        };
        for observer in observers {
            observer(self);
        }
        true
    }

    #[must_use]
    pub fn is_done(&self) -> bool { self.state().outcome.is_some() }

    /// Outcome of the callback, once complete.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<(), Arc<CallbackError>>> { self.state().outcome.clone() }

    /// Number of observers waiting for completion.
    #[must_use]
    pub fn pending_observers(&self) -> usize { self.state().observers.len() }

    /// Run `observer` once the callback completes.
    pub fn on_completion<F>(&self, observer: F)
    where
        F: FnOnce(&CompletionHandle) + Send + 'static,
    {
        let mut state = self.state();
        if state.outcome.is_some() {
            drop(state);
            observer(self);
        } else {
            state.observers.push(Box::new(observer));
        }
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("CompletionHandle")
            .field("outcome", &state.outcome)
            .field("observers", &state.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn observers_run_once_on_completion() {
        let handle = CompletionHandle::pending();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        handle.on_completion(move |h| {
            assert!(h.is_done());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.pending_observers(), 1);

        assert!(handle.complete(Ok(())));
        assert!(!handle.complete(Err(CallbackError::Panicked("late".into()))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(handle.outcome(), Some(Ok(()))));
    }

    #[test]
    fn late_observer_runs_immediately() {
        let handle = CompletionHandle::pending();
        handle.complete(Err(CallbackError::Panicked("boom".into())));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        handle.on_completion(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
