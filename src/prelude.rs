//! Optional convenience imports for common subscriber workflows.
//!
//! Prefer importing specialised APIs directly from their owning modules.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pullstream::prelude::*;
//!
//! fn build() -> Result<Policy, PolicyError> {
//!     Policy::builder(MemoryChannel::new(), "projects/demo/subscriptions/orders").build()
//! }
//! ```

pub use crate::{
    channel::{Channel, MemoryChannel, StreamReader, StreamWriter},
    config::PolicyConfig,
    control::ControlRequest,
    error::{StatusCode, StreamError},
    executor::{BoxError, CallbackExecutor},
    future::SubscriptionFuture,
    message::Message,
    policy::{Policy, PolicyError},
};
