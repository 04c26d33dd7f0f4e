//! Tunable settings for a [`Policy`](crate::policy::Policy).
//!
//! All types deserialize with `serde` and fall back to their defaults for
//! missing fields, so a configuration file only needs to name what it
//! overrides.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::helper::DEFAULT_JOIN_TIMEOUT;

/// Limits on how much work may be leased before reads pause.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlowControl {
    /// Maximum total payload bytes held by leased messages.
    pub max_bytes: usize,
    /// Maximum number of leased messages.
    pub max_messages: usize,
    /// Load below which a paused consumer resumes reading.
    pub resume_threshold: f64,
    /// Longest a message stays leased before it is dropped from maintenance.
    pub max_lease_duration: Duration,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            max_messages: 1000,
            resume_threshold: 0.8,
            max_lease_duration: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Exponential back-off applied between receive attempts after a transient
/// stream error.
///
/// The delay starts at `initial_delay` and doubles on each consecutive
/// failure, capped at `max_delay`. A successful receive resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to at least one millisecond and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use pullstream::config::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay following `current`, doubled and capped.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Settings for a policy and the components it builds.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub flow_control: FlowControl,
    pub backoff: BackoffConfig,
    /// Threads in the default callback executor.
    pub executor_workers: usize,
    /// Callbacks admitted to the default executor before `submit` blocks.
    pub executor_queue_bound: usize,
    /// Bound on each thread join during shutdown.
    pub join_timeout: Duration,
    /// Whether to run the lease maintenance thread.
    pub lease_maintenance: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            flow_control: FlowControl::default(),
            backoff: BackoffConfig::default(),
            executor_workers: 10,
            executor_queue_bound: 1000,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            lease_maintenance: true,
        }
    }
}

/// A configuration value outside its accepted range.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("resume_threshold must be in (0, 1], got {0}")]
    ResumeThreshold(f64),
}

impl PolicyConfig {
    /// Check that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("flow_control.max_bytes", self.flow_control.max_bytes),
            ("flow_control.max_messages", self.flow_control.max_messages),
            ("executor_workers", self.executor_workers),
            ("executor_queue_bound", self.executor_queue_bound),
        ];
        if let Some((field, _)) = nonzero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }
        let threshold = self.flow_control.resume_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ResumeThreshold(threshold));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_validate() { assert_eq!(PolicyConfig::default().validate(), Ok(())); }

    #[rstest]
    #[case::workers(
        PolicyConfig { executor_workers: 0, ..PolicyConfig::default() },
        "executor_workers"
    )]
    #[case::bound(
        PolicyConfig { executor_queue_bound: 0, ..PolicyConfig::default() },
        "executor_queue_bound"
    )]
    #[case::messages(
        PolicyConfig {
            flow_control: FlowControl { max_messages: 0, ..FlowControl::default() },
            ..PolicyConfig::default()
        },
        "flow_control.max_messages"
    )]
    fn zero_limits_rejected(#[case] config: PolicyConfig, #[case] field: &'static str) {
        assert_eq!(config.validate(), Err(ConfigError::Zero { field }));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.5)]
    #[case(f64::NAN)]
    fn resume_threshold_out_of_range(#[case] threshold: f64) {
        let config = PolicyConfig {
            flow_control: FlowControl {
                resume_threshold: threshold,
                ..FlowControl::default()
            },
            ..PolicyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ResumeThreshold(_))
        ));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
        };
        let second = backoff.next_delay(backoff.initial_delay);
        assert_eq!(second, Duration::from_millis(20));
        assert_eq!(backoff.next_delay(second), Duration::from_millis(25));
    }
}
