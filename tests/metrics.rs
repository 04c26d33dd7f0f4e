#![cfg(feature = "metrics")]
//! Tests for `pullstream` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

mod common;

use std::sync::Arc;

use common::build_policy;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use pullstream::{
    channel::MemoryChannel,
    config::FlowControl,
    error::{StatusCode, StreamError, classify},
    metrics as pm,
};
use pullstream_testing::{InlineExecutor, TestResult, batch};
use rstest::rstest;

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn assert_counter_eq(
    snapshotter: &Snapshotter,
    name: &str,
    label: Option<(&str, &str)>,
    expected: u64,
) {
    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
                && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {metrics:#?}"
    );
}

#[rstest]
#[case(1)]
#[case(7)]
fn received_messages_are_counted(#[case] count: usize) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || pm::inc_messages_received(count));
    assert_counter_eq(&snapshotter, pm::MESSAGES_RECEIVED, None, count as u64);
}

#[rstest]
#[case(StatusCode::DeadlineExceeded, "transient")]
#[case(StatusCode::Unavailable, "fatal")]
fn stream_errors_are_labelled_by_class(#[case] code: StatusCode, #[case] class: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        pm::inc_stream_errors(&classify(StreamError::new(code, "boom")));
    });
    assert_counter_eq(&snapshotter, pm::STREAM_ERRORS, Some(("class", class)), 1);
}

#[test]
fn control_requests_are_labelled_by_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        pm::inc_control_requests("ack");
        pm::inc_control_requests("ack");
        pm::inc_control_requests("close");
    });
    assert_counter_eq(&snapshotter, pm::CONTROL_REQUESTS, Some(("kind", "ack")), 2);
    assert_counter_eq(&snapshotter, pm::CONTROL_REQUESTS, Some(("kind", "close")), 1);
}

#[test]
fn dispatch_records_deliveries_failures_and_leases() -> TestResult {
    let channel = MemoryChannel::new();
    let policy = build_policy(&channel, Arc::new(InlineExecutor), FlowControl::default());
    policy.open(|message| {
        if message.lease_id() == "bad" {
            return Err("rejected".into());
        }
        Ok(())
    })?;

    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        policy.on_response(batch(["good", "bad", "other"]));
    });

    assert_counter_eq(&snapshotter, pm::MESSAGES_RECEIVED, None, 3);
    assert_counter_eq(&snapshotter, pm::CALLBACK_ERRORS, None, 1);
    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == pm::LEASED_MESSAGES
                && matches!(value, DebugValue::Gauge(g) if g.0 > 2.5)
        }),
        "leased gauge not recorded: {metrics:#?}"
    );
    Ok(())
}
