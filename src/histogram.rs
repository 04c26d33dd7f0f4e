//! Acknowledgement latency histogram.
//!
//! Samples are whole seconds clamped to the range the broker accepts for an
//! acknowledgement deadline. The 99th percentile of observed latency becomes
//! the deadline requested when leases are extended.

use std::collections::BTreeMap;

/// Smallest deadline, in seconds, the broker accepts.
pub const MIN_ACK_DEADLINE_SECS: u32 = 10;
/// Largest deadline, in seconds, the broker accepts.
pub const MAX_ACK_DEADLINE_SECS: u32 = 600;

/// Counts of acknowledgement latencies bucketed by whole second.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    buckets: BTreeMap<u32, u64>,
    len: u64,
}

impl Histogram {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of samples recorded.
    #[must_use]
    pub fn len(&self) -> u64 { self.len }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Whether a sample with exactly `seconds` has been recorded.
    #[must_use]
    pub fn contains(&self, seconds: u32) -> bool { self.buckets.contains_key(&seconds) }

    /// Record one latency sample, clamped to the accepted deadline range.
    pub fn add(&mut self, seconds: u64) {
        let clamped = u32::try_from(seconds)
            .unwrap_or(MAX_ACK_DEADLINE_SECS)
            .clamp(MIN_ACK_DEADLINE_SECS, MAX_ACK_DEADLINE_SECS);
        *self.buckets.entry(clamped).or_insert(0) += 1;
        self.len += 1;
    }

    /// Smallest recorded sample, or the minimum deadline when empty.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.buckets
            .keys()
            .next()
            .copied()
            .unwrap_or(MIN_ACK_DEADLINE_SECS)
    }

    /// Largest recorded sample, or the maximum deadline when empty.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.buckets
            .keys()
            .next_back()
            .copied()
            .unwrap_or(MAX_ACK_DEADLINE_SECS)
    }

    /// Latency at or below which `percent` of samples fall.
    ///
    /// Values above 100 are treated as 100. An empty histogram yields the
    /// minimum deadline.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts stay far below 2^52"
    )]
    pub fn percentile(&self, percent: u32) -> u32 {
        let percent = f64::from(percent.min(100));
        let len = self.len as f64;
        let mut target = len - len * (percent / 100.0);
        for (&seconds, &count) in self.buckets.iter().rev() {
            target -= count as f64;
            if target < 0.0 {
                return seconds;
            }
        }
        MIN_ACK_DEADLINE_SECS
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_histogram_uses_bounds() {
        let histogram = Histogram::new();
        assert_eq!(histogram.len(), 0);
        assert_eq!(histogram.min(), MIN_ACK_DEADLINE_SECS);
        assert_eq!(histogram.max(), MAX_ACK_DEADLINE_SECS);
        assert_eq!(histogram.percentile(99), MIN_ACK_DEADLINE_SECS);
    }

    #[rstest]
    #[case::below_floor(3, 10)]
    #[case::in_range(42, 42)]
    #[case::above_ceiling(6_000, 600)]
    fn samples_are_clamped(#[case] sample: u64, #[case] stored: u32) {
        let mut histogram = Histogram::new();
        histogram.add(sample);
        assert!(histogram.contains(stored));
        assert_eq!(histogram.len(), 1);
    }

    #[test]
    fn percentiles_follow_distribution() {
        let mut histogram = Histogram::new();
        for seconds in 10..=109 {
            histogram.add(seconds);
        }
        assert_eq!(histogram.percentile(99), 108);
        assert_eq!(histogram.percentile(90), 99);
        assert_eq!(histogram.percentile(50), 59);
        assert_eq!(histogram.percentile(250), 109);
        assert_eq!(histogram.min(), 10);
        assert_eq!(histogram.max(), 109);
    }

    proptest! {
        #[test]
        fn percentile_stays_within_recorded_range(
            samples in proptest::collection::vec(0u64..2_000, 1..200),
            percent in 0u32..=100,
        ) {
            let mut histogram = Histogram::new();
            for sample in &samples {
                histogram.add(*sample);
            }
            let value = histogram.percentile(percent);
            prop_assert!(value >= MIN_ACK_DEADLINE_SECS);
            prop_assert!(value <= histogram.max());
        }
    }
}
