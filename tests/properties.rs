//! Property tests for acknowledgement latency tracking and back-off.

use std::time::Duration;

use proptest::prelude::*;
use pullstream::{config::BackoffConfig, histogram::Histogram, lease::LeaseManager};

proptest! {
    #[test]
    fn percentile_is_monotonic(
        samples in prop::collection::vec(10u64..600, 1..200),
        low in 1u32..=100,
        high in 1u32..=100,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let mut histogram = Histogram::new();
        for sample in samples {
            histogram.add(sample);
        }
        prop_assert!(histogram.percentile(low) <= histogram.percentile(high));
    }

    #[test]
    fn backoff_never_exceeds_max(
        initial_ms in 0u64..5_000,
        max_ms in 0u64..20_000,
        steps in 1usize..32,
    ) {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
        }
        .normalized();
        let mut delay = backoff.initial_delay;
        for _ in 0..steps {
            let next = backoff.next_delay(delay);
            prop_assert!(next <= backoff.max_delay);
            prop_assert!(next >= delay);
            delay = next;
        }
    }

    #[test]
    fn releasing_every_lease_restores_idle_load(
        sizes in prop::collection::vec(0usize..4_096, 0..64),
    ) {
        let leases = LeaseManager::default();
        for (i, size) in sizes.iter().enumerate() {
            leases.lease(&format!("ack-{i}"), *size);
        }
        prop_assert_eq!(leases.len(), sizes.len());
        prop_assert_eq!(leases.bytes(), sizes.iter().sum::<usize>());
        for i in 0..sizes.len() {
            let ack_id = format!("ack-{i}");
            prop_assert!(leases.release(&ack_id));
        }
        prop_assert!(leases.is_empty());
        prop_assert_eq!(leases.bytes(), 0);
        prop_assert!(leases.load() < f64::EPSILON);
    }
}
