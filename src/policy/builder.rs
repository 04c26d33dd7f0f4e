//! Builder for [`Policy`].

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use super::{Lifecycle, Policy, PolicyError, PolicyShared};
use crate::{
    channel::Channel,
    config::{BackoffConfig, FlowControl, PolicyConfig},
    consumer::Consumer,
    executor::{CallbackExecutor, ThreadPoolExecutor},
    lease::LeaseManager,
};

/// Configures and builds a [`Policy`].
///
/// Every setter overrides the matching field of the [`PolicyConfig`] in
/// effect, so the order of [`config`](Self::config) and the individual
/// setters matters.
#[must_use]
pub struct PolicyBuilder {
    channel: Arc<dyn Channel>,
    subscription: String,
    config: PolicyConfig,
    executor: Option<Arc<dyn CallbackExecutor>>,
}

impl PolicyBuilder {
    pub(super) fn new(channel: Arc<dyn Channel>, subscription: String) -> Self {
        Self {
            channel,
            subscription,
            config: PolicyConfig::default(),
            executor: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    /// Run callbacks on `executor` instead of a [`ThreadPoolExecutor`].
    ///
    /// The executor stays the caller's: closing the policy never shuts it
    /// down, so it may be shared between policies.
    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.config.flow_control = flow_control;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Bound on each thread join during [`Policy::close`].
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Enable or disable periodic lease extension.
    pub fn lease_maintenance(mut self, enabled: bool) -> Self {
        self.config.lease_maintenance = enabled;
        self
    }

    /// Validate the configuration and assemble the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Config`] for an invalid configuration and
    /// [`PolicyError::Executor`] if the default executor cannot start.
    pub fn build(self) -> Result<Policy, PolicyError> {
        let Self {
            channel,
            subscription,
            config,
            executor,
        } = self;
        config.validate()?;
        let owns_executor = executor.is_none();
        let executor = match executor {
            Some(executor) => executor,
            None => Arc::new(ThreadPoolExecutor::new(
                config.executor_workers,
                config.executor_queue_bound,
            )?),
        };
        let consumer = Consumer::with_options(channel, config.backoff, config.join_timeout);
        let leases = Arc::new(LeaseManager::new(config.flow_control));
        Ok(Policy {
            shared: Arc::new(PolicyShared {
                subscription,
                config,
                executor,
                owns_executor,
                admission: CancellationToken::new(),
                consumer,
                leases,
                lifecycle: Mutex::new(Lifecycle::Idle),
                callback: OnceLock::new(),
                future: OnceLock::new(),
                requests: OnceLock::new(),
                leaser: Mutex::new(None),
            }),
        })
    }
}
