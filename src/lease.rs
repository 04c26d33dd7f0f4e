//! Bookkeeping for messages leased to the client.
//!
//! A message is leased from the moment its batch arrives until its callback
//! acknowledges or declines it. The [`LeaseManager`] tracks the outstanding
//! set, learns the acknowledgement deadline from observed latency and reports
//! the load used for flow control.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::trace;

use crate::{
    config::FlowControl,
    histogram::{Histogram, MIN_ACK_DEADLINE_SECS},
    metrics,
};

#[derive(Debug)]
struct Lease {
    bytes: usize,
    leased_at: Instant,
}

#[derive(Debug)]
struct LeaseState {
    leases: HashMap<String, Lease>,
    bytes: usize,
    histogram: Histogram,
    ack_deadline: u32,
    sampled_at: u64,
}

/// Thread-safe registry of leased messages.
#[derive(Debug)]
pub struct LeaseManager {
    flow_control: FlowControl,
    state: Mutex<LeaseState>,
}

impl LeaseManager {
    #[must_use]
    pub fn new(flow_control: FlowControl) -> Self {
        Self {
            flow_control,
            state: Mutex::new(LeaseState {
                leases: HashMap::new(),
                bytes: 0,
                histogram: Histogram::new(),
                ack_deadline: MIN_ACK_DEADLINE_SECS,
                sampled_at: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flow control limits this manager reports load against.
    #[must_use]
    pub fn flow_control(&self) -> FlowControl { self.flow_control }

    /// Start tracking `ack_id`. Leasing an id twice keeps the first entry.
    pub fn lease(&self, ack_id: &str, bytes: usize) {
        let mut state = self.state();
        if state.leases.contains_key(ack_id) {
            trace!("lease already held: ack_id={ack_id}");
            return;
        }
        state.leases.insert(
            ack_id.to_owned(),
            Lease {
                bytes,
                leased_at: Instant::now(),
            },
        );
        state.bytes += bytes;
        metrics::set_leased_messages(state.leases.len());
    }

    /// Stop tracking `ack_id`. Returns `false` if it was not leased.
    pub fn release(&self, ack_id: &str) -> bool {
        let mut state = self.state();
        let Some(lease) = state.leases.remove(ack_id) else {
            return false;
        };
        state.bytes = state.bytes.saturating_sub(lease.bytes);
        metrics::set_leased_messages(state.leases.len());
        true
    }

    /// How long `ack_id` has been leased, if it is.
    #[must_use]
    pub fn age(&self, ack_id: &str) -> Option<Duration> {
        self.state()
            .leases
            .get(ack_id)
            .map(|lease| lease.leased_at.elapsed())
    }

    /// Release every lease held longer than the configured maximum.
    ///
    /// Returns the released ids. The broker redelivers them once their
    /// current deadline lapses.
    pub fn expire(&self) -> Vec<String> {
        let max_age = self.flow_control.max_lease_duration;
        let mut state = self.state();
        let expired: Vec<String> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.leased_at.elapsed() >= max_age)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();
        for ack_id in &expired {
            if let Some(lease) = state.leases.remove(ack_id) {
                state.bytes = state.bytes.saturating_sub(lease.bytes);
            }
        }
        if !expired.is_empty() {
            metrics::set_leased_messages(state.leases.len());
        }
        expired
    }

    /// Record how long a callback took to acknowledge its message.
    pub fn record_ack_latency(&self, latency: Duration) {
        self.state().histogram.add(latency.as_secs());
    }

    /// Deadline, in seconds, to request when extending leases.
    ///
    /// The 99th percentile of acknowledgement latency, recomputed only once
    /// the sample count has grown past `min(2n, n + 100)` where `n` is the
    /// count at the previous recomputation.
    pub fn ack_deadline(&self) -> u32 {
        let mut state = self.state();
        let sampled_at = state.sampled_at;
        let target = sampled_at.saturating_mul(2).min(sampled_at + 100);
        if state.histogram.len() > target {
            state.ack_deadline = state.histogram.percentile(99);
            state.sampled_at = state.histogram.len();
        }
        state.ack_deadline
    }

    /// Ids of every message currently leased, in no particular order.
    #[must_use]
    pub fn leased_ack_ids(&self) -> Vec<String> { self.state().leases.keys().cloned().collect() }

    /// Number of leased messages.
    #[must_use]
    pub fn len(&self) -> usize { self.state().leases.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.state().leases.is_empty() }

    /// Total payload bytes held by leased messages.
    #[must_use]
    pub fn bytes(&self) -> usize { self.state().bytes }

    /// Fraction of the flow control budget in use.
    ///
    /// The larger of the message and byte ratios; `1.0` means a limit has
    /// been reached.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "load is an approximate ratio"
    )]
    pub fn load(&self) -> f64 {
        let state = self.state();
        let ratio = |used: usize, limit: usize| {
            if limit == 0 {
                0.0
            } else {
                used as f64 / limit as f64
            }
        };
        ratio(state.leases.len(), self.flow_control.max_messages)
            .max(ratio(state.bytes, self.flow_control.max_bytes))
    }

    /// Whether reads should pause.
    #[must_use]
    pub fn is_overloaded(&self) -> bool { self.load() >= 1.0 }

    /// Whether a paused consumer may resume reading.
    #[must_use]
    pub fn can_resume(&self) -> bool { self.load() < self.flow_control.resume_threshold }
}

impl Default for LeaseManager {
    fn default() -> Self { Self::new(FlowControl::default()) }
}
