//! The message handed to a subscriber callback.
//!
//! A [`Message`] wraps one delivered payload together with the lease that
//! keeps the broker from redelivering it. Settling the lease never touches
//! the stream directly: [`Message::acknowledge`], [`Message::extend_lease`]
//! and [`Message::decline`] enqueue a [`ControlRequest`] for the
//! control-dispatch worker and return immediately.

use std::{
    collections::HashMap,
    fmt,
    time::{Instant, SystemTime},
};

use bytes::Bytes;
use log::debug;

use crate::{control::ControlRequest, helper::RequestSender, types::ReceivedMessage};

/// A delivered message awaiting acknowledgement.
pub struct Message {
    payload: Bytes,
    attributes: HashMap<String, String>,
    lease_id: String,
    message_id: String,
    publish_time: Option<SystemTime>,
    received_at: Instant,
    size: usize,
    requests: RequestSender<ControlRequest>,
}

impl Message {
    /// Wrap `received` so that lease actions travel through `requests`.
    #[must_use]
    pub fn new(received: ReceivedMessage, requests: RequestSender<ControlRequest>) -> Self {
        let ReceivedMessage { ack_id, message } = received;
        Self {
            size: message.data.len(),
            payload: message.data,
            attributes: message.attributes,
            lease_id: ack_id,
            message_id: message.message_id,
            publish_time: message.publish_time,
            received_at: Instant::now(),
            requests,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Alias of [`payload`](Self::payload).
    #[must_use]
    pub fn data(&self) -> &Bytes { &self.payload }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, String> { &self.attributes }

    /// Value of the attribute named `key`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Acknowledgement id identifying the lease.
    #[must_use]
    pub fn lease_id(&self) -> &str { &self.lease_id }

    #[must_use]
    pub fn message_id(&self) -> &str { &self.message_id }

    #[must_use]
    pub fn publish_time(&self) -> Option<SystemTime> { self.publish_time }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize { self.size }

    /// Confirm processing; the broker will not redeliver the message.
    pub fn acknowledge(&self) {
        self.enqueue(ControlRequest::Ack {
            ack_id: self.lease_id.clone(),
            byte_size: self.size,
            time_to_ack: Some(self.received_at.elapsed()),
        });
    }

    /// Ask the broker to hold the lease for another `seconds`.
    pub fn extend_lease(&self, seconds: u32) {
        self.enqueue(ControlRequest::extend_lease(self.lease_id.clone(), seconds));
    }

    /// Give the message back for immediate redelivery.
    pub fn decline(&self) {
        self.enqueue(ControlRequest::Decline {
            ack_id: self.lease_id.clone(),
            byte_size: self.size,
        });
    }

    fn enqueue(&self, request: ControlRequest) {
        let kind = request.kind();
        if self.requests.send(request).is_err() {
            debug!(
                "dropping control request after close: kind={kind}, ack_id={}",
                self.lease_id
            );
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("lease_id", &self.lease_id)
            .field("message_id", &self.message_id)
            .field("size", &self.size)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
