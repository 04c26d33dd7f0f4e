//! Stream error types and their classification.
//!
//! Errors surfaced by a [`StreamReader`](crate::channel::StreamReader) or
//! [`StreamWriter`](crate::channel::StreamWriter) carry a [`StatusCode`]
//! mirroring the broker's RPC status. [`classify`] sorts them into the two
//! outcomes the policy acts on: transient errors are retried locally and
//! never reach the subscription future, fatal errors resolve it.

use std::fmt;

use thiserror::Error;

/// Status codes reported by the streaming-pull channel.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Internal,
    Unavailable,
    Unauthenticated,
}

impl StatusCode {
    /// Canonical upper-case name of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error raised by the streaming-pull channel.
///
/// Cloneable so a single failure can be handed both to the subscription
/// future and to the caller that observed it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StreamError {
    code: StatusCode,
    message: String,
}

impl StreamError {
    /// Create an error with the given status code and description.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error reported when the broker ends the stream without being asked to.
    #[must_use]
    pub fn stream_ended() -> Self {
        Self::new(StatusCode::Unavailable, "stream closed by broker")
    }

    /// Error reported when a write is attempted on a closed stream.
    #[must_use]
    pub fn stream_closed() -> Self { Self::new(StatusCode::Cancelled, "stream already closed") }

    /// Status code of the error.
    #[must_use]
    pub fn code(&self) -> StatusCode { self.code }

    /// Human readable description.
    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    /// Whether the error belongs to the transient class.
    #[must_use]
    pub fn is_transient(&self) -> bool { matches!(self.code, StatusCode::DeadlineExceeded) }
}

/// Outcome of classifying a [`StreamError`].
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recovered locally; the subscription carries on.
    Transient,
    /// Terminal for the subscription.
    Fatal(StreamError),
}

impl ErrorClass {
    /// Label used for logging and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Fatal(_) => "fatal",
        }
    }
}

/// Classify a stream error.
///
/// Only the deadline-exceeded class is transient: the channel layer has
/// already retried the call, and the receive loop reads again after a
/// back-off. Everything else is fatal.
#[must_use]
pub fn classify(error: StreamError) -> ErrorClass {
    if error.is_transient() {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal(error)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn deadline_exceeded_is_transient() {
        let err = StreamError::new(StatusCode::DeadlineExceeded, "slow");
        assert_eq!(classify(err), ErrorClass::Transient);
    }

    #[rstest]
    #[case::unavailable(StatusCode::Unavailable)]
    #[case::not_found(StatusCode::NotFound)]
    #[case::internal(StatusCode::Internal)]
    #[case::cancelled(StatusCode::Cancelled)]
    fn other_codes_are_fatal(#[case] code: StatusCode) {
        let err = StreamError::new(code, "boom");
        assert_eq!(classify(err.clone()), ErrorClass::Fatal(err));
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = StreamError::new(StatusCode::PermissionDenied, "no access");
        assert_eq!(err.to_string(), "PERMISSION_DENIED: no access");
    }
}
