//! Error types for request queues and the helper thread registry.

use std::io;

use thiserror::Error;

/// Returned when enqueueing on a queue whose worker has gone away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("request queue closed")]
pub struct QueueClosed;

/// Errors raised while registering or starting helper threads.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A worker with this name is already registered.
    #[error("helper thread {0:?} is already registered")]
    Duplicate(String),
    /// The operating system refused to spawn the thread.
    #[error("failed to spawn helper thread {name:?}")]
    Spawn {
        /// Name of the worker that failed to start.
        name: String,
        #[source]
        source: io::Error,
    },
}
