//! Panic containment for worker threads.
//!
//! Helper threads and callback workers run user or handler code that may
//! panic. [`catch`] runs such code and hands back the payload as a
//! [`PanicMessage`] so the worker can log it and keep going.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};

/// A caught panic payload, displayable for logs.
///
/// `String` and `&'static str` payloads render as their text; anything else
/// falls back to `Debug`.
///
/// ```
/// use pullstream::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// Text of the payload, if it carried any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl fmt::Debug for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}

/// Wrap a payload returned by `catch_unwind` or `JoinHandle::join`.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Run `f`, converting an unwinding panic into a [`PanicMessage`].
///
/// # Errors
///
/// Returns the panic payload if `f` panicked.
pub fn catch<R>(f: impl FnOnce() -> R) -> Result<R, PanicMessage> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(format_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_returns_value_without_panic() {
        assert_eq!(catch(|| 7).expect("no panic"), 7);
    }

    #[test]
    fn catch_captures_formatted_payload() {
        let err = catch(|| -> u8 { panic!("bad message {}", 3) }).expect_err("must panic");
        assert_eq!(err.as_str(), Some("bad message 3"));
        assert_eq!(err.to_string(), "bad message 3");
    }

    #[test]
    fn non_text_payload_uses_debug() {
        let err = catch(|| -> u8 { std::panic::panic_any(42_u8) }).expect_err("must panic");
        assert!(err.as_str().is_none());
        assert!(err.to_string().contains("Any"));
    }
}
