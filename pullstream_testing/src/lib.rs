//! Utilities for driving a [`Policy`](pullstream::policy::Policy) in tests.
//!
//! Provides executors that let a test decide when callbacks run, a recording
//! [`StreamWriter`](pullstream::channel::StreamWriter), message builders and a
//! log capture fixture.
//!
//! ```rust
//! use pullstream_testing::{RecordingWriter, batch};
//!
//! let response = batch(["a", "b"]);
//! assert_eq!(response.len(), 2);
//! assert!(RecordingWriter::new().events().is_empty());
//! ```

mod executor;
pub mod logging;
mod writer;

use std::{
    thread,
    time::{Duration, Instant},
};

pub use executor::{InlineExecutor, RecordingExecutor};
pub use logging::{LoggerHandle, logger};
use pullstream::types::{PubsubMessage, PullResponse, ReceivedMessage};
pub use writer::RecordingWriter;

/// Result type used by fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How long [`wait_until`] polls before failing the test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A delivered message whose payload and message id derive from `ack_id`.
#[must_use]
pub fn received(ack_id: &str) -> ReceivedMessage {
    ReceivedMessage::new(
        ack_id,
        PubsubMessage::new(format!("payload-{ack_id}"), format!("id-{ack_id}")),
    )
}

/// A batch of [`received`] messages.
pub fn batch<'a>(ack_ids: impl IntoIterator<Item = &'a str>) -> PullResponse {
    ack_ids.into_iter().map(received).collect()
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
///
/// # Panics
///
/// Panics if the condition does not hold in time.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(2));
    }
}
