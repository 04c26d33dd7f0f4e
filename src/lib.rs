#![doc(html_root_url = "https://docs.rs/pullstream/latest")]
//! Public API for the `pullstream` library.
//!
//! This crate provides the client side of a streaming-pull subscriber: a
//! [`Consumer`](consumer::Consumer) owning a bidirectional stream, a
//! [`Policy`](policy::Policy) fanning delivered messages out to callbacks on
//! a worker pool, and the single-writer control path that carries
//! acknowledgements and lease changes back to the broker.

pub mod channel;
pub mod config;
pub mod consumer;
pub mod control;
pub mod error;
pub mod executor;
pub mod future;
pub mod helper;
pub mod histogram;
pub mod lease;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod policy;
pub mod prelude;
pub mod types;

pub use error::{ErrorClass, StatusCode, StreamError, classify};
pub use future::{AlreadyResolved, FutureError, SubscriptionFuture};
pub use message::Message;
pub use policy::{Lifecycle, Policy, PolicyBuilder, PolicyError};
