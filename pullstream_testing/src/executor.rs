//! Executors giving tests control over when callbacks run.

use std::sync::{Mutex, MutexGuard, PoisonError};

use pullstream::{
    executor::{CallbackExecutor, CompletionHandle, ExecutorError, MessageCallback, invoke},
    message::Message,
};

struct Submission {
    lease_id: String,
    handle: CompletionHandle,
    job: Option<(MessageCallback, Message)>,
}

/// Executor that records every submission and runs nothing until told to.
///
/// Handles stay pending until [`complete_all`](Self::complete_all) or
/// [`complete_next`](Self::complete_next) runs the recorded callbacks on the
/// calling thread.
#[derive(Default)]
pub struct RecordingExecutor {
    submissions: Mutex<Vec<Submission>>,
    shut_down: Mutex<bool>,
}

impl RecordingExecutor {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn submissions(&self) -> MutexGuard<'_, Vec<Submission>> {
        self.submissions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease ids of submitted messages in submission order.
    #[must_use]
    pub fn lease_ids(&self) -> Vec<String> {
        self.submissions().iter().map(|s| s.lease_id.clone()).collect()
    }

    /// Handles returned by `submit`, in submission order.
    #[must_use]
    pub fn handles(&self) -> Vec<CompletionHandle> {
        self.submissions().iter().map(|s| s.handle.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.submissions().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.submissions().is_empty() }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the oldest callback that has not run yet.
    ///
    /// Returns `false` when every recorded callback has already run.
    pub fn complete_next(&self) -> bool {
        let next = self
            .submissions()
            .iter_mut()
            .find_map(|s| s.job.take().map(|job| (job, s.handle.clone())));
        let Some(((callback, message), handle)) = next else {
            return false;
        };
        handle.complete(invoke(&callback, message));
        true
    }

    /// Run every pending callback in submission order.
    pub fn complete_all(&self) -> usize {
        let mut ran = 0;
        while self.complete_next() {
            ran += 1;
        }
        ran
    }
}

impl CallbackExecutor for RecordingExecutor {
    fn submit(
        &self,
        callback: MessageCallback,
        message: Message,
    ) -> Result<CompletionHandle, ExecutorError> {
        if self.is_shut_down() {
            return Err(ExecutorError::Shutdown);
        }
        let handle = CompletionHandle::pending();
        self.submissions().push(Submission {
            lease_id: message.lease_id().to_owned(),
            handle: handle.clone(),
            job: Some((callback, message)),
        });
        Ok(handle)
    }

    fn shutdown(&self) { *self.shut_down.lock().unwrap_or_else(PoisonError::into_inner) = true; }
}

/// Executor running each callback on the submitting thread.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn submit(
        &self,
        callback: MessageCallback,
        message: Message,
    ) -> Result<CompletionHandle, ExecutorError> {
        let handle = CompletionHandle::pending();
        handle.complete(invoke(&callback, message));
        Ok(handle)
    }
}
