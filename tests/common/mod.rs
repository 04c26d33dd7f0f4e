//! Shared fixtures for integration tests.
//!
//! Builds policies over a [`MemoryChannel`] with lease maintenance disabled
//! so tests control every control request that reaches the stream.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{sync::Arc, time::Duration};

use pullstream::{
    channel::MemoryChannel,
    config::{BackoffConfig, FlowControl},
    executor::{BoxError, CallbackExecutor},
    message::Message,
    policy::Policy,
};
use pullstream_testing::RecordingExecutor;
use rstest::fixture;

pub const SUBSCRIPTION: &str = "projects/demo/subscriptions/orders";

/// A policy whose callbacks only run when the test says so.
pub struct Dispatch {
    pub channel: MemoryChannel,
    pub executor: Arc<RecordingExecutor>,
    pub policy: Policy,
}

/// Build a policy over `channel` using `executor` and `flow_control`.
#[expect(
    clippy::expect_used,
    reason = "a policy that fails to build must abort the test immediately"
)]
pub fn build_policy(
    channel: &MemoryChannel,
    executor: Arc<dyn CallbackExecutor>,
    flow_control: FlowControl,
) -> Policy {
    Policy::builder(channel.clone(), SUBSCRIPTION)
        .executor(executor)
        .flow_control(flow_control)
        .backoff(fast_backoff())
        .lease_maintenance(false)
        .join_timeout(Duration::from_secs(2))
        .build()
        .expect("build policy")
}

/// Back-off short enough that retries do not slow tests down.
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    }
}

#[fixture]
pub fn dispatch() -> Dispatch {
    let channel = MemoryChannel::new();
    let executor = Arc::new(RecordingExecutor::new());
    let policy = build_policy(&channel, executor.clone(), FlowControl::default());
    Dispatch {
        channel,
        executor,
        policy,
    }
}

pub fn noop(_: Message) -> Result<(), BoxError> { Ok(()) }
