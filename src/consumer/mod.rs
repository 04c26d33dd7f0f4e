//! Owner of the bidirectional stream.
//!
//! A [`Consumer`] opens the stream through a [`Channel`] and splits it
//! between two threads: the receive loop, which hands every inbound batch
//! to a [`ConsumerHandler`], and the control-dispatch worker registered
//! under [`CALLBACK_REQUEST_WORKER`], which owns the [`StreamWriter`] and
//! applies queued [`ControlRequest`]s in order. No other thread writes to
//! the stream.

mod gate;
mod receive;

use std::{
    fmt,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use self::{gate::FlowGate, receive::ReceiveLoop};
use crate::{
    channel::{Channel, StreamWriter},
    config::BackoffConfig,
    control::ControlRequest,
    error::StreamError,
    helper::{
        DEFAULT_JOIN_TIMEOUT,
        HelperThreadRegistry,
        RegistryError,
        RequestQueue,
        RequestSender,
        join_with_timeout,
    },
    types::{InitialRequest, PullResponse},
};

/// Registry name of the control-dispatch worker.
pub const CALLBACK_REQUEST_WORKER: &str = "callback request worker";

/// Name of the receive-loop thread.
pub const RECEIVE_THREAD: &str = "consume bidirectional stream";

/// Receiver of everything a [`Consumer`] observes on the stream.
pub trait ConsumerHandler: Send + Sync + 'static {
    /// First request sent when the stream opens.
    fn initial_request(&self) -> InitialRequest;

    /// Called on the receive thread for every batch.
    fn on_response(&self, response: PullResponse);

    /// Called on the receive thread when reading fails.
    ///
    /// # Errors
    ///
    /// Returning the error stops the receive loop; returning `Ok` has it
    /// retry after a back-off.
    fn on_exception(&self, error: StreamError) -> Result<(), StreamError>;

    /// Called on the control-dispatch worker for every queued request.
    ///
    /// # Errors
    ///
    /// A returned error is logged by the worker, which carries on.
    fn on_callback_request(
        &self,
        writer: &mut dyn StreamWriter,
        request: ControlRequest,
    ) -> Result<(), StreamError>;
}

/// Errors raised by [`Consumer::start_consuming`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer is already active")]
    AlreadyActive,
    #[error("failed to open stream: {0}")]
    Open(#[from] StreamError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to spawn receive thread")]
    Spawn(#[source] io::Error),
}

struct ActiveStream {
    shutdown: CancellationToken,
    requests: RequestSender<ControlRequest>,
    receiver: JoinHandle<()>,
}

/// Streaming-pull consumer owning one stream at a time.
pub struct Consumer {
    channel: Arc<dyn Channel>,
    registry: HelperThreadRegistry,
    gate: Arc<FlowGate>,
    backoff: BackoffConfig,
    join_timeout: Duration,
    active: Mutex<Option<ActiveStream>>,
}

impl Consumer {
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_options(channel, BackoffConfig::default(), DEFAULT_JOIN_TIMEOUT)
    }

    /// Create a consumer with a custom back-off and join timeout.
    #[must_use]
    pub fn with_options(
        channel: Arc<dyn Channel>,
        backoff: BackoffConfig,
        join_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            registry: HelperThreadRegistry::with_join_timeout(join_timeout),
            gate: Arc::new(FlowGate::default()),
            backoff,
            join_timeout,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the stream and start the receive and control threads.
    ///
    /// `queue` feeds the control-dispatch worker; producers should hold
    /// senders obtained from it before it is handed over.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::AlreadyActive`] while a stream is running,
    /// [`ConsumerError::Open`] if the channel rejects the stream, and
    /// registry or spawn errors if a thread cannot be started. Nothing is
    /// left running on error.
    pub fn start_consuming(
        &self,
        handler: &Arc<dyn ConsumerHandler>,
        queue: RequestQueue<ControlRequest>,
    ) -> Result<(), ConsumerError> {
        let mut active = self.active();
        if active.is_some() {
            return Err(ConsumerError::AlreadyActive);
        }
        let (reader, writer) = self.channel.open(handler.initial_request())?;
        let requests = queue.sender();
        self.registry.register(
            CALLBACK_REQUEST_WORKER,
            queue,
            dispatcher(Arc::downgrade(handler), writer),
        )?;
        if let Err(error) = self.registry.start() {
            self.registry.stop(CALLBACK_REQUEST_WORKER);
            return Err(error.into());
        }

        self.gate.reopen();
        let shutdown = CancellationToken::new();
        let receive = ReceiveLoop {
            reader,
            handler: Arc::downgrade(handler),
            gate: Arc::clone(&self.gate),
            shutdown: shutdown.clone(),
            backoff: self.backoff,
        };
        let receiver = match thread::Builder::new()
            .name(RECEIVE_THREAD.to_owned())
            .spawn(move || receive.run())
        {
            Ok(handle) => handle,
            Err(error) => {
                let _ = requests.send(ControlRequest::Close);
                self.registry.stop(CALLBACK_REQUEST_WORKER);
                return Err(ConsumerError::Spawn(error));
            }
        };
        *active = Some(ActiveStream {
            shutdown,
            requests,
            receiver,
        });
        info!("consumer started");
        Ok(())
    }

    /// Stop the receive loop and the control-dispatch worker.
    ///
    /// Closing the stream is the worker's last write. Idempotent, and safe
    /// from any thread including the receive thread itself.
    pub fn stop_consuming(&self) {
        let Some(stream) = self.active().take() else {
            debug!("stop_consuming: consumer not active");
            return;
        };
        stream.shutdown.cancel();
        self.gate.close();
        if stream.requests.send(ControlRequest::Close).is_err() {
            debug!("control worker already exited before close");
        }
        self.registry.stop(CALLBACK_REQUEST_WORKER);
        join_with_timeout(RECEIVE_THREAD, stream.receiver, self.join_timeout);
        info!("consumer stopped");
    }

    /// Hold the receive loop before its next read.
    pub fn pause(&self) {
        if !self.gate.is_paused() {
            debug!("pausing stream reads");
        }
        self.gate.pause();
    }

    /// Let a paused receive loop read again.
    pub fn resume(&self) {
        if self.gate.is_paused() {
            debug!("resuming stream reads");
        }
        self.gate.resume();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool { self.gate.is_paused() }

    /// Whether a stream is running.
    #[must_use]
    pub fn is_active(&self) -> bool { self.active().is_some() }

    /// Registry holding the control-dispatch worker.
    #[must_use]
    pub fn registry(&self) -> &HelperThreadRegistry { &self.registry }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("active", &self.is_active())
            .field("paused", &self.is_paused())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) { self.stop_consuming(); }
}

/// Build the control-dispatch handler that owns `writer`.
///
/// Requests arriving after `Close` has been applied are dropped.
fn dispatcher(
    handler: Weak<dyn ConsumerHandler>,
    mut writer: Box<dyn StreamWriter>,
) -> impl FnMut(ControlRequest) -> Result<(), StreamError> + Send + 'static {
    let mut closed = false;
    move |request| {
        if closed {
            debug!("dropping control request after close: kind={}", request.kind());
            return Ok(());
        }
        let closing = matches!(request, ControlRequest::Close);
        let result = match handler.upgrade() {
            Some(handler) => handler.on_callback_request(writer.as_mut(), request),
            None if closing => writer.close(),
            None => {
                debug!("stream handler dropped: kind={}", request.kind());
                Ok(())
            }
        };
        closed |= closing;
        result
    }
}
