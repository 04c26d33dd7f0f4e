//! Stream events handled by the policy.
//!
//! The consumer calls into these on its own threads: batches and errors on
//! the receive thread, control requests on the control-dispatch worker.

use std::{slice, sync::Arc};

use log::{debug, error, warn};

use super::{Lifecycle, PolicyShared};
use crate::{
    channel::StreamWriter,
    consumer::ConsumerHandler,
    control::ControlRequest,
    error::{ErrorClass, StreamError, classify},
    executor::{CallbackError, CompletionHandle, ExecutorError},
    message::Message,
    metrics,
    types::{InitialRequest, PullResponse},
};

impl ConsumerHandler for PolicyShared {
    fn initial_request(&self) -> InitialRequest {
        let stream_ack_deadline_seconds = self.leases.ack_deadline();
        let modify_deadline_ack_ids = self.leases.leased_ack_ids();
        let modify_deadline_seconds =
            vec![stream_ack_deadline_seconds; modify_deadline_ack_ids.len()];
        InitialRequest {
            subscription: self.subscription.clone(),
            stream_ack_deadline_seconds,
            modify_deadline_ack_ids,
            modify_deadline_seconds,
        }
    }

    fn on_response(&self, response: PullResponse) {
        if self.state() != Lifecycle::Open {
            warn!(
                "dropping batch received while not open: messages={}",
                response.len()
            );
            return;
        }
        let (Some(callback), Some(requests)) = (self.callback.get(), self.requests.get()) else {
            warn!("dropping batch: no callback registered");
            return;
        };
        debug!("dispatching batch: messages={}", response.len());
        metrics::inc_messages_received(response.len());
        for received in response.received_messages {
            let ack_id = received.ack_id.clone();
            self.leases.lease(&ack_id, received.message.data.len());
            let message = Message::new(received, requests.clone());
            match self
                .executor
                .submit_until(Arc::clone(callback), message, &self.admission)
            {
                Ok(handle) => handle.on_completion(on_callback_completed),
                Err(ExecutorError::Cancelled) => {
                    debug!("policy closing; callback not scheduled: ack_id={ack_id}");
                    self.leases.release(&ack_id);
                    break;
                }
                Err(error) => {
                    warn!("callback not scheduled: ack_id={ack_id}, error={error}");
                    self.leases.release(&ack_id);
                }
            }
        }
        if self.leases.is_overloaded() {
            self.consumer.pause();
        }
    }

    fn on_exception(&self, error: StreamError) -> Result<(), StreamError> {
        if error.is_transient() {
            debug!("transient stream error; retrying: error={error}");
        }
        let class = classify(error);
        metrics::inc_stream_errors(&class);
        let ErrorClass::Fatal(error) = class else {
            return Ok(());
        };
        warn!("fatal stream error: subscription={}, error={error}", self.subscription);
        if let Some(future) = self.future.get()
            && future.set_exception(error.clone()).is_err()
        {
            debug!("subscription future already resolved; keeping first outcome");
        }
        if self.state() == Lifecycle::Open {
            self.close();
        }
        Err(error)
    }

    fn on_callback_request(
        &self,
        writer: &mut dyn StreamWriter,
        request: ControlRequest,
    ) -> Result<(), StreamError> {
        metrics::inc_control_requests(request.kind());
        let result = match request {
            ControlRequest::Ack {
                ack_id,
                time_to_ack,
                ..
            } => {
                let written = writer.acknowledge(slice::from_ref(&ack_id));
                self.leases.release(&ack_id);
                if let Some(latency) = time_to_ack {
                    self.leases.record_ack_latency(latency);
                }
                written
            }
            ControlRequest::ExtendLease { ack_ids, seconds } => {
                writer.modify_ack_deadline(&ack_ids, seconds)
            }
            ControlRequest::Decline { ack_id, .. } => {
                let written = writer.modify_ack_deadline(slice::from_ref(&ack_id), 0);
                self.leases.release(&ack_id);
                written
            }
            ControlRequest::Close => writer.close(),
        };
        self.resume_if_drained();
        result
    }
}

/// Completion observer attached to every submitted callback.
///
/// Callback failures and panics are logged and counted; they never reach
/// the subscription future.
pub fn on_callback_completed(handle: &CompletionHandle) {
    let Some(Err(failure)) = handle.outcome() else {
        return;
    };
    metrics::inc_callback_errors();
    match failure.as_ref() {
        CallbackError::Panicked(panic) => {
            tracing::error!(panic = %panic, "subscriber callback panicked");
        }
        CallbackError::Failed(error) => error!("subscriber callback failed: error={error}"),
    }
}
