//! Named background workers draining request queues.
//!
//! A [`HelperThreadRegistry`] owns a set of OS threads, each blocked on its
//! own [`RequestQueue`]. Producers on any thread enqueue work through a
//! [`RequestSender`] without blocking; the worker invokes its handler for
//! every item in FIFO order.

mod errors;
mod queue;
mod registry;

pub use errors::{QueueClosed, RegistryError};
pub use queue::{Job, RequestQueue, RequestSender};
pub use registry::{DEFAULT_JOIN_TIMEOUT, HelperThreadRegistry};
pub(crate) use registry::join_with_timeout;

#[cfg(test)]
mod tests;
