//! Control actions queued for the stream-owning worker.

use std::time::Duration;

/// A control action destined for the stream.
///
/// Produced by [`Message`](crate::message::Message) methods, the lease
/// maintenance thread and the consumer's shutdown path, and consumed exactly
/// once by the control-dispatch worker, which is the only writer on the
/// stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    /// Acknowledge a message, ending its lease.
    Ack {
        ack_id: String,
        byte_size: usize,
        time_to_ack: Option<Duration>,
    },
    /// Push the acknowledgement deadline of leased messages forward.
    ExtendLease { ack_ids: Vec<String>, seconds: u32 },
    /// Hand a message back to the broker for redelivery.
    Decline { ack_id: String, byte_size: usize },
    /// Close the stream. Always the last write of a worker.
    Close,
}

impl ControlRequest {
    /// Acknowledge `ack_id` without size or latency bookkeeping.
    #[must_use]
    pub fn ack(ack_id: impl Into<String>) -> Self {
        Self::Ack {
            ack_id: ack_id.into(),
            byte_size: 0,
            time_to_ack: None,
        }
    }

    /// Extend the lease of a single message.
    #[must_use]
    pub fn extend_lease(ack_id: impl Into<String>, seconds: u32) -> Self {
        Self::ExtendLease {
            ack_ids: vec![ack_id.into()],
            seconds,
        }
    }

    /// Decline `ack_id` without size bookkeeping.
    #[must_use]
    pub fn decline(ack_id: impl Into<String>) -> Self {
        Self::Decline {
            ack_id: ack_id.into(),
            byte_size: 0,
        }
    }

    /// Short name used in logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ControlRequest::Ack { .. } => "ack",
            ControlRequest::ExtendLease { .. } => "extend_lease",
            ControlRequest::Decline { .. } => "decline",
            ControlRequest::Close => "close",
        }
    }
}
