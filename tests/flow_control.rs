//! Flow control: the consumer pauses when outstanding leases exceed the
//! configured limits and resumes once acknowledgements bring them back
//! under the resume threshold.

mod common;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use common::{SUBSCRIPTION, build_policy, noop};
use pullstream::{
    channel::MemoryChannel,
    config::FlowControl,
    control::ControlRequest,
    policy::Policy,
};
use pullstream_testing::{RecordingExecutor, RecordingWriter, TestResult, batch, wait_until};
use rstest::rstest;

#[rstest]
#[case::by_messages(FlowControl { max_messages: 2, ..FlowControl::default() })]
#[case::by_bytes(FlowControl { max_bytes: 18, ..FlowControl::default() })]
fn overload_pauses_and_acks_resume(#[case] flow_control: FlowControl) -> TestResult {
    let channel = MemoryChannel::new();
    let policy = build_policy(&channel, Arc::new(RecordingExecutor::new()), flow_control);
    policy.open(noop)?;

    // Payloads are "payload-<id>": nine bytes for one-letter ids.
    policy.on_response(batch(["a", "b"]));
    assert!(policy.leases().is_overloaded());
    assert!(policy.consumer().is_paused());

    let mut writer = RecordingWriter::new();
    policy.on_callback_request(&mut writer, ControlRequest::ack("a"))?;
    assert!(!policy.consumer().is_paused());
    assert_eq!(policy.leases().leased_ack_ids(), ["b"]);
    Ok(())
}

#[test]
fn paused_consumer_stops_reading_until_resumed() -> TestResult {
    let channel = MemoryChannel::new();
    let executor = Arc::new(RecordingExecutor::new());
    let flow_control = FlowControl {
        max_messages: 1,
        ..FlowControl::default()
    };
    let policy = build_policy(&channel, executor.clone(), flow_control);
    policy.open(|message| {
        message.acknowledge();
        Ok(())
    })?;

    channel.publish(batch(["first"]));
    channel.publish(batch(["second"]));
    wait_until(|| policy.consumer().is_paused());
    assert_eq!(executor.lease_ids(), ["first"]);

    executor.complete_all();
    wait_until(|| executor.len() == 2);
    assert_eq!(executor.lease_ids(), ["first", "second"]);
    Ok(())
}

#[test]
fn expired_leases_lift_flow_control() -> TestResult {
    let channel = MemoryChannel::new();
    let policy = Policy::builder(channel.clone(), SUBSCRIPTION)
        .flow_control(FlowControl {
            max_messages: 1,
            max_lease_duration: Duration::from_millis(50),
            ..FlowControl::default()
        })
        .join_timeout(Duration::from_secs(2))
        .build()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        policy.open(move |message| {
            seen.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.lease_id().to_owned());
            Err("never settled".into())
        })?;
    }

    channel.publish(batch(["first"]));
    channel.publish(batch(["second"]));

    wait_until(|| seen.lock().unwrap_or_else(PoisonError::into_inner).len() == 2);
    assert_eq!(
        *seen.lock().unwrap_or_else(PoisonError::into_inner),
        ["first", "second"]
    );
    Ok(())
}
