//! Receive loop driving inbound batches into the handler.

use std::sync::{Arc, Weak};

use log::{debug, error, warn};
use tokio_util::sync::CancellationToken;

use super::{ConsumerHandler, gate::FlowGate};
use crate::{channel::StreamReader, config::BackoffConfig, error::StreamError};

pub(super) struct ReceiveLoop {
    pub reader: Box<dyn StreamReader>,
    pub handler: Weak<dyn ConsumerHandler>,
    pub gate: Arc<FlowGate>,
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
}

impl ReceiveLoop {
    /// Read until cancelled or a fatal error is propagated by the handler.
    ///
    /// Errors the handler swallows are retried after an exponential
    /// back-off. Anything read after cancellation is discarded.
    pub(super) fn run(mut self) {
        let backoff = self.backoff.normalized();
        let mut delay = backoff.initial_delay;
        while self.gate.wait_open() && !self.shutdown.is_cancelled() {
            let received = self.reader.receive();
            if self.shutdown.is_cancelled() {
                break;
            }
            let Some(handler) = self.handler.upgrade() else {
                warn!("stream handler dropped; receive loop exiting");
                break;
            };
            let error = match received {
                Ok(Some(response)) => {
                    delay = backoff.initial_delay;
                    handler.on_response(response);
                    continue;
                }
                Ok(None) => StreamError::stream_ended(),
                Err(error) => error,
            };
            if let Err(error) = handler.on_exception(error) {
                error!("stream failed; receive loop exiting: error={error}");
                break;
            }
            drop(handler);
            debug!("retrying receive after transient error: delay={delay:?}");
            if !self.gate.sleep(delay) {
                break;
            }
            delay = backoff.next_delay(delay);
        }
        debug!("receive loop exiting");
    }
}
