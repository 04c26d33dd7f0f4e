//! Metric helpers for `pullstream`.
//!
//! This module defines metric names and small helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::error::ErrorClass;

/// Name of the counter tracking messages delivered to callbacks.
pub const MESSAGES_RECEIVED: &str = "pullstream_messages_received_total";
/// Name of the counter tracking callbacks that returned an error or panicked.
pub const CALLBACK_ERRORS: &str = "pullstream_callback_errors_total";
/// Name of the counter tracking control requests written to the stream.
pub const CONTROL_REQUESTS: &str = "pullstream_control_requests_total";
/// Name of the counter tracking stream errors by class.
pub const STREAM_ERRORS: &str = "pullstream_stream_errors_total";
/// Name of the gauge tracking leased messages.
pub const LEASED_MESSAGES: &str = "pullstream_leased_messages";

/// Record `count` messages handed to the executor.
pub fn inc_messages_received(count: usize) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_RECEIVED).increment(count as u64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Record a failed or panicking callback.
pub fn inc_callback_errors() {
    #[cfg(feature = "metrics")]
    counter!(CALLBACK_ERRORS).increment(1);
}

/// Record a control request of `kind` dispatched to the stream.
pub fn inc_control_requests(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(CONTROL_REQUESTS, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a stream error after classification.
pub fn inc_stream_errors(class: &ErrorClass) {
    #[cfg(feature = "metrics")]
    counter!(STREAM_ERRORS, "class" => class.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = class;
}

/// Publish the number of leased messages.
#[cfg_attr(
    feature = "metrics",
    expect(clippy::cast_precision_loss, reason = "gauge values are approximate")
)]
pub fn set_leased_messages(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(LEASED_MESSAGES).set(count as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}
