//! The streaming-pull channel boundary.
//!
//! A [`Channel`] opens one bidirectional stream per call. The stream is split
//! into a [`StreamReader`], owned by the consumer's receive loop, and a
//! [`StreamWriter`], owned by the control-dispatch worker. Because each half
//! has exactly one owner, no two threads ever write to the same stream.
//!
//! Transport, encoding and credentials live behind these traits.
//! [`MemoryChannel`] is an in-process implementation for tests and demos.

mod memory;

pub use memory::{MemoryChannel, WriteEvent};

use crate::{
    error::StreamError,
    types::{InitialRequest, PullResponse},
};

/// Factory for streaming-pull streams.
pub trait Channel: Send + Sync + 'static {
    /// Open a stream, sending `initial` as its first request.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] if the broker rejects the stream.
    fn open(
        &self,
        initial: InitialRequest,
    ) -> Result<(Box<dyn StreamReader>, Box<dyn StreamWriter>), StreamError>;
}

/// Read half of a stream.
pub trait StreamReader: Send {
    /// Block until the broker delivers the next batch.
    ///
    /// Returns `Ok(None)` once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns the [`StreamError`] that broke the stream.
    fn receive(&mut self) -> Result<Option<PullResponse>, StreamError>;
}

/// Write half of a stream.
pub trait StreamWriter: Send {
    /// Acknowledge the given leases.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] if the write fails.
    fn acknowledge(&mut self, ack_ids: &[String]) -> Result<(), StreamError>;

    /// Set the acknowledgement deadline of the given leases. Zero seconds
    /// returns the messages for redelivery.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] if the write fails.
    fn modify_ack_deadline(&mut self, ack_ids: &[String], seconds: u32)
    -> Result<(), StreamError>;

    /// Half-close the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] if the stream is already closed.
    fn close(&mut self) -> Result<(), StreamError>;
}
