//! In-process broker implementing [`Channel`].

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use log::debug;

use super::{Channel, StreamReader, StreamWriter};
use crate::{
    error::StreamError,
    types::{InitialRequest, PullResponse, ReceivedMessage},
};

/// A write observed by a [`MemoryChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteEvent {
    Acknowledge(Vec<String>),
    ModifyAckDeadline { ack_ids: Vec<String>, seconds: u32 },
    Close,
}

#[derive(Debug, Default)]
struct Broker {
    pending: VecDeque<Result<PullResponse, StreamError>>,
    open_error: Option<StreamError>,
    initial_requests: Vec<InitialRequest>,
    events: Vec<WriteEvent>,
    stream: u64,
    closed: bool,
    ended: bool,
}

#[derive(Debug, Default)]
struct Shared {
    broker: Mutex<Broker>,
    changed: Condvar,
}

impl Shared {
    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Broker living in the current process.
///
/// Batches and injected errors are delivered in the order they were queued.
/// Every write is recorded so callers can inspect what reached the stream.
/// Cloning yields another handle on the same broker.
#[derive(Clone, Debug, Default)]
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

impl MemoryChannel {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Queue a batch for delivery.
    pub fn publish(&self, response: PullResponse) { self.push(Ok(response)); }

    /// Queue a batch built from `messages`.
    pub fn publish_batch(&self, messages: impl IntoIterator<Item = ReceivedMessage>) {
        self.publish(messages.into_iter().collect());
    }

    /// Make the reader fail with `error` once earlier batches are delivered.
    pub fn fail_with(&self, error: StreamError) { self.push(Err(error)); }

    /// Make the next [`Channel::open`] fail with `error`.
    pub fn fail_open(&self, error: StreamError) { self.shared.broker().open_error = Some(error); }

    /// End the current stream once queued items are drained.
    pub fn end_stream(&self) {
        self.shared.broker().ended = true;
        self.shared.changed.notify_all();
    }

    fn push(&self, item: Result<PullResponse, StreamError>) {
        self.shared.broker().pending.push_back(item);
        self.shared.changed.notify_all();
    }

    /// Every write recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<WriteEvent> { self.shared.broker().events.clone() }

    /// Ack ids acknowledged so far, in order.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<String> {
        self.shared
            .broker()
            .events
            .iter()
            .filter_map(|event| match event {
                WriteEvent::Acknowledge(ids) => Some(ids.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of times the stream was closed by the client.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.shared
            .broker()
            .events
            .iter()
            .filter(|event| matches!(event, WriteEvent::Close))
            .count()
    }

    /// Initial requests received, one per successful open.
    #[must_use]
    pub fn initial_requests(&self) -> Vec<InitialRequest> {
        self.shared.broker().initial_requests.clone()
    }

    /// Number of streams opened.
    #[must_use]
    pub fn opened(&self) -> usize { self.shared.broker().initial_requests.len() }
}

impl Channel for MemoryChannel {
    fn open(
        &self,
        initial: InitialRequest,
    ) -> Result<(Box<dyn StreamReader>, Box<dyn StreamWriter>), StreamError> {
        let mut broker = self.shared.broker();
        if let Some(error) = broker.open_error.take() {
            return Err(error);
        }
        debug!("memory stream opened: subscription={}", initial.subscription);
        broker.initial_requests.push(initial);
        broker.stream += 1;
        broker.closed = false;
        broker.ended = false;
        let stream = broker.stream;
        drop(broker);
        let reader = MemoryReader {
            shared: Arc::clone(&self.shared),
            stream,
        };
        let writer = MemoryWriter {
            shared: Arc::clone(&self.shared),
            stream,
        };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

struct MemoryReader {
    shared: Arc<Shared>,
    stream: u64,
}

impl StreamReader for MemoryReader {
    fn receive(&mut self) -> Result<Option<PullResponse>, StreamError> {
        let mut broker = self.shared.broker();
        loop {
            if broker.stream != self.stream || broker.closed {
                return Ok(None);
            }
            if let Some(item) = broker.pending.pop_front() {
                return item.map(Some);
            }
            if broker.ended {
                return Ok(None);
            }
            broker = self
                .shared
                .changed
                .wait(broker)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct MemoryWriter {
    shared: Arc<Shared>,
    stream: u64,
}

impl MemoryWriter {
    fn record(&self, event: WriteEvent) -> Result<(), StreamError> {
        let mut broker = self.shared.broker();
        if broker.stream != self.stream || broker.closed {
            return Err(StreamError::stream_closed());
        }
        if event == WriteEvent::Close {
            broker.closed = true;
        }
        broker.events.push(event);
        drop(broker);
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl StreamWriter for MemoryWriter {
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

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{error::StatusCode, types::PubsubMessage};

    fn open(channel: &MemoryChannel) -> (Box<dyn StreamReader>, Box<dyn StreamWriter>) {
        channel
            .open(InitialRequest::default())
            .expect("open memory stream")
    }

    #[test]
    fn delivers_batches_then_errors_in_order() {
        let channel = MemoryChannel::new();
        channel.publish_batch([ReceivedMessage::new("a", PubsubMessage::new("x", "1"))]);
        channel.fail_with(StreamError::new(StatusCode::DeadlineExceeded, "slow"));
        let (mut reader, _writer) = open(&channel);

        let batch = reader.receive().expect("batch").expect("not ended");
        assert_eq!(batch.len(), 1);
        let err = reader.receive().expect_err("injected error");
        assert_eq!(err.code(), StatusCode::DeadlineExceeded);
    }

    #[test]
    fn close_wakes_blocked_reader_and_rejects_writes() {
        let channel = MemoryChannel::new();
        let (mut reader, mut writer) = open(&channel);
        let blocked = thread::spawn(move || reader.receive());
        thread::sleep(Duration::from_millis(20));

        writer.close().expect("first close");
        assert_eq!(blocked.join().expect("reader thread"), Ok(None));
        assert_eq!(writer.close(), Err(StreamError::stream_closed()));
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn open_failure_is_one_shot() {
        let channel = MemoryChannel::new();
        channel.fail_open(StreamError::new(StatusCode::NotFound, "no subscription"));
        assert!(channel.open(InitialRequest::default()).is_err());
        assert!(channel.open(InitialRequest::default()).is_ok());
        assert_eq!(channel.opened(), 1);
    }

    #[test]
    fn writes_are_recorded() {
        let channel = MemoryChannel::new();
        let (_reader, mut writer) = open(&channel);
        writer.acknowledge(&["a".into(), "b".into()]).expect("ack");
        writer.modify_ack_deadline(&["c".into()], 0).expect("nack");
        assert_eq!(channel.acknowledged(), vec!["a", "b"]);
        assert_eq!(
            channel.events()[1],
            WriteEvent::ModifyAckDeadline {
                ack_ids: vec!["c".into()],
                seconds: 0
            }
        );
    }
}
