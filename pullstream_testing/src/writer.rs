//! A [`StreamWriter`] that records every call.

use std::sync::{Arc, Mutex, PoisonError};

use pullstream::{
    channel::{StreamWriter, WriteEvent},
    error::StreamError,
};

/// Writer recording calls for later inspection.
///
/// Clones share the same record, so a test can keep one handle while the
/// code under test owns another. Writes after `close` fail the way a real
/// stream would.
#[derive(Clone, Debug, Default)]
pub struct RecordingWriter {
    events: Arc<Mutex<Vec<WriteEvent>>>,
}

impl RecordingWriter {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn events(&self) -> Vec<WriteEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every acknowledged lease id, flattened in write order.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                WriteEvent::Acknowledge(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record(&self, event: WriteEvent) -> Result<(), StreamError> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.last() == Some(&WriteEvent::Close) {
            return Err(StreamError::stream_closed());
        }
        events.push(event);
        Ok(())
    }
}

impl StreamWriter for RecordingWriter {
    fn acknowledge(&mut self, ack_ids: &[String]) -> Result<(), StreamError> {
        self.record(WriteEvent::Acknowledge(ack_ids.to_vec()))
    }

    fn modify_ack_deadline(
        &mut self,
        ack_ids: &[String],
        seconds: u32,
    ) -> Result<(), StreamError> {
        self.record(WriteEvent::ModifyAckDeadline {
            ack_ids: ack_ids.to_vec(),
            seconds,
        })
    }

    fn close(&mut self) -> Result<(), StreamError> { self.record(WriteEvent::Close) }
}
