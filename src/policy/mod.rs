//! Subscription policy: lifecycle, fan-out and error classification.
//!
//! A [`Policy`] ties a [`Consumer`], a [`CallbackExecutor`] and a
//! [`SubscriptionFuture`] together. [`Policy::open`] starts streaming and
//! hands each delivered message to the user callback on the executor;
//! [`Policy::close`] tears everything down and resolves the future.
//!
//! ```no_run
//! use pullstream::{channel::MemoryChannel, policy::Policy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = Policy::builder(MemoryChannel::new(), "projects/demo/subscriptions/orders")
//!     .build()?;
//! let future = policy.open(|message| {
//!     println!("received {} bytes", message.size());
//!     message.acknowledge();
//!     Ok(())
//! })?;
//! policy.close();
//! future.result(None)?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod handler;
mod leaser;

use std::{
    fmt,
    io,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak},
};

pub use builder::PolicyBuilder;
pub use handler::on_callback_completed;
use log::{debug, info};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use self::leaser::Leaser;
use crate::{
    channel::{Channel, StreamWriter},
    config::{ConfigError, PolicyConfig},
    consumer::{Consumer, ConsumerError, ConsumerHandler},
    control::ControlRequest,
    error::StreamError,
    executor::{BoxError, CallbackExecutor, ExecutorError, MessageCallback},
    future::SubscriptionFuture,
    helper::{RequestQueue, RequestSender},
    lease::LeaseManager,
    message::Message,
    types::PullResponse,
};

/// Lifecycle state of a [`Policy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built but not yet streaming.
    Idle,
    /// Streaming and dispatching callbacks.
    Open,
    /// Shut down for good.
    Closed,
}

/// Errors raised by [`Policy`] operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy is already open")]
    AlreadyOpen,
    #[error("policy is closed")]
    Closed,
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("failed to spawn lease maintenance thread")]
    Spawn(#[source] io::Error),
}

pub(crate) struct PolicyShared {
    subscription: String,
    config: PolicyConfig,
    executor: Arc<dyn CallbackExecutor>,
    owns_executor: bool,
    admission: CancellationToken,
    consumer: Consumer,
    leases: Arc<LeaseManager>,
    lifecycle: Mutex<Lifecycle>,
    callback: OnceLock<MessageCallback>,
    future: OnceLock<SubscriptionFuture>,
    requests: OnceLock<RequestSender<ControlRequest>>,
    leaser: Mutex<Option<Leaser>>,
}

impl PolicyShared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> Lifecycle { *self.lifecycle() }

    fn open(
        self: &Arc<Self>,
        callback: MessageCallback,
    ) -> Result<SubscriptionFuture, PolicyError> {
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Open => return Err(PolicyError::AlreadyOpen),
            Lifecycle::Closed => return Err(PolicyError::Closed),
        }
        let future = self.future.get_or_init(SubscriptionFuture::new).clone();
        let queue = RequestQueue::new();
        let requests = queue.sender();
        let handler: Arc<dyn ConsumerHandler> = Arc::<Self>::clone(self);
        self.consumer.start_consuming(&handler, queue)?;

        if self.config.lease_maintenance {
            let policy = Arc::downgrade(self);
            let on_expired = move || {
                if let Some(policy) = policy.upgrade() {
                    policy.resume_if_drained();
                }
            };
            match Leaser::spawn(
                Arc::clone(&self.leases),
                requests.clone(),
                self.config.join_timeout,
                on_expired,
            ) {
                Ok(leaser) => {
                    *self.leaser.lock().unwrap_or_else(PoisonError::into_inner) = Some(leaser);
                }
                Err(error) => {
                    self.consumer.stop_consuming();
                    return Err(PolicyError::Spawn(error));
                }
            }
        }
        let stale = self.callback.set(callback).is_err() | self.requests.set(requests).is_err();
        if stale {
            debug!("callback already registered by an earlier open");
        }
        *lifecycle = Lifecycle::Open;
        info!("policy opened: subscription={}", self.subscription);
        Ok(future)
    }

    fn close(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle();
            std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
        };
        match previous {
            Lifecycle::Closed => {
                debug!("close: policy already closed");
                return;
            }
            Lifecycle::Idle => {
                self.admission.cancel();
                self.consumer.stop_consuming();
                self.shutdown_executor();
                info!("policy closed before opening: subscription={}", self.subscription);
                return;
            }
            Lifecycle::Open => {}
        }
        self.admission.cancel();
        self.shutdown_executor();
        self.stop_leaser();
        self.consumer.stop_consuming();
        if let Some(future) = self.future.get()
            && future.set_result().is_err()
        {
            debug!("subscription future already resolved before close");
        }
        info!("policy closed: subscription={}", self.subscription);
    }

    fn shutdown_executor(&self) {
        if self.owns_executor {
            self.executor.shutdown();
        }
    }

    /// Lift flow control once enough leases have been released.
    fn resume_if_drained(&self) {
        if self.consumer.is_paused() && self.leases.can_resume() {
            debug!("flow control released: leased={}", self.leases.len());
            self.consumer.resume();
        }
    }

    fn stop_leaser(&self) {
        let leaser = self
            .leaser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(leaser) = leaser {
            leaser.stop();
        }
    }
}

/// Orchestrates one streaming-pull subscription.
///
/// Dropping the policy closes it.
pub struct Policy {
    shared: Arc<PolicyShared>,
}

impl Policy {
    /// Start building a policy reading `subscription` through `channel`.
    #[must_use]
    pub fn builder(channel: impl Channel, subscription: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(Arc::new(channel), subscription.into())
    }

    /// Open the stream and dispatch every delivered message to `callback`.
    ///
    /// Returns the future that resolves when the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::AlreadyOpen`] or [`PolicyError::Closed`] when
    /// not idle. If the stream cannot be opened the error is returned and the
    /// policy stays idle.
    pub fn open<F>(&self, callback: F) -> Result<SubscriptionFuture, PolicyError>
    where
        F: Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.shared.open(Arc::new(callback))
    }

    /// Stop streaming and resolve the future without error.
    ///
    /// Idempotent. May be called from any thread, including a callback via
    /// [`closer`](Self::closer).
    pub fn close(&self) { self.shared.close(); }

    /// Handle that can close this policy from another thread.
    #[must_use]
    pub fn closer(&self) -> PolicyCloser { PolicyCloser(Arc::downgrade(&self.shared)) }

    /// The future handed out by [`open`](Self::open), if opened.
    #[must_use]
    pub fn future(&self) -> Option<SubscriptionFuture> { self.shared.future.get().cloned() }

    #[must_use]
    pub fn state(&self) -> Lifecycle { self.shared.state() }

    #[must_use]
    pub fn subscription(&self) -> &str { &self.shared.subscription }

    #[must_use]
    pub fn consumer(&self) -> &Consumer { &self.shared.consumer }

    #[must_use]
    pub fn leases(&self) -> &LeaseManager { &self.shared.leases }

    /// Fan a batch out to the executor.
    pub fn on_response(&self, response: PullResponse) { self.shared.on_response(response); }

    /// Apply one control request to `writer`.
    ///
    /// # Errors
    ///
    /// Returns the [`StreamError`] raised by the write.
    pub fn on_callback_request(
        &self,
        writer: &mut dyn StreamWriter,
        request: ControlRequest,
    ) -> Result<(), StreamError> {
        self.shared.on_callback_request(writer, request)
    }

    /// Classify a stream error.
    ///
    /// # Errors
    ///
    /// Returns `error` unchanged when it is fatal, after resolving the future
    /// with it and closing the policy.
    pub fn on_exception(&self, error: StreamError) -> Result<(), StreamError> {
        self.shared.on_exception(error)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("subscription", &self.shared.subscription)
            .field("state", &self.state())
            .field("consumer", &self.shared.consumer)
            .finish_non_exhaustive()
    }
}

impl Drop for Policy {
    fn drop(&mut self) { self.shared.close(); }
}

/// Weak handle closing a [`Policy`] from a callback or another thread.
#[derive(Clone, Debug)]
pub struct PolicyCloser(Weak<PolicyShared>);

impl PolicyCloser {
    /// Close the policy if it still exists.
    pub fn close(&self) {
        if let Some(shared) = self.0.upgrade() {
            shared.close();
        }
    }
}
