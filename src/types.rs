//! Data carried over the streaming-pull stream.
//!
//! These are the decoded forms handed across the [`Channel`] boundary. The
//! wire encoding itself belongs to the channel implementation.
//!
//! [`Channel`]: crate::channel::Channel

use std::{collections::HashMap, time::SystemTime};

use bytes::Bytes;

/// A message as published to the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubsubMessage {
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub message_id: String,
    pub publish_time: Option<SystemTime>,
}

impl PubsubMessage {
    /// Create a message carrying `data` with no attributes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, message_id: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            attributes: HashMap::new(),
            message_id: message_id.into(),
            publish_time: None,
        }
    }

    /// Attach an attribute, replacing any previous value for `key`.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One delivered message together with the lease token that identifies it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: PubsubMessage,
}

impl ReceivedMessage {
    #[must_use]
    pub fn new(ack_id: impl Into<String>, message: PubsubMessage) -> Self {
        Self {
            ack_id: ack_id.into(),
            message,
        }
    }
}

/// A batch delivered by the broker on the stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullResponse {
    pub received_messages: Vec<ReceivedMessage>,
}

impl PullResponse {
    #[must_use]
    pub fn new(received_messages: Vec<ReceivedMessage>) -> Self { Self { received_messages } }

    #[must_use]
    pub fn len(&self) -> usize { self.received_messages.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.received_messages.is_empty() }
}

impl FromIterator<ReceivedMessage> for PullResponse {
    fn from_iter<I: IntoIterator<Item = ReceivedMessage>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// First request written when a stream is opened.
///
/// Names the subscription, sets the stream-wide acknowledgement deadline and
/// re-leases any messages the client is still processing from an earlier
/// stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitialRequest {
    pub subscription: String,
    pub stream_ack_deadline_seconds: u32,
    pub modify_deadline_ack_ids: Vec<String>,
    pub modify_deadline_seconds: Vec<u32>,
}
