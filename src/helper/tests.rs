//! Unit tests for request queues and the helper thread registry.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rstest::{fixture, rstest};

use super::*;

type Seen = Arc<Mutex<Vec<u32>>>;

#[fixture]
fn registry() -> HelperThreadRegistry {
    HelperThreadRegistry::with_join_timeout(Duration::from_secs(2))
}

fn recording_handler(seen: &Seen) -> impl FnMut(u32) -> Result<(), String> + Send + 'static {
    let seen = Arc::clone(seen);
    move |item| {
        if item == 13 {
            return Err(format!("unlucky item {item}"));
        }
        if item == 99 {
            panic!("item {item} makes the handler panic");
        }
        seen.lock().expect("seen lock").push(item);
        Ok(())
    }
}

#[rstest]
fn worker_handles_items_in_fifo_order(registry: HelperThreadRegistry) {
    let seen = Seen::default();
    let queue = RequestQueue::new();
    let sender = queue.sender();
    registry
        .register("fifo", queue, recording_handler(&seen))
        .expect("register");
    for i in 0..5 {
        sender.send(i).expect("send");
    }
    assert_eq!(registry.start().expect("start"), 1);
    for i in 5..8 {
        sender.send(i).expect("send");
    }

    assert!(registry.stop("fifo"));
    assert_eq!(*seen.lock().expect("seen lock"), (0..8).collect::<Vec<_>>());
}

#[rstest]
fn handler_errors_and_panics_do_not_stop_worker(registry: HelperThreadRegistry) {
    let seen = Seen::default();
    let queue = RequestQueue::new();
    let sender = queue.sender();
    registry
        .register("resilient", queue, recording_handler(&seen))
        .expect("register");
    registry.start().expect("start");

    for item in [1, 13, 2, 99, 3] {
        sender.send(item).expect("send");
    }
    registry.stop("resilient");

    assert_eq!(*seen.lock().expect("seen lock"), vec![1, 2, 3]);
}

#[rstest]
fn stop_removes_entry_and_closes_queue(registry: HelperThreadRegistry) {
    let queue = RequestQueue::<u32>::new();
    let sender = queue.sender();
    registry
        .register("short-lived", queue, |_| Ok::<_, String>(()))
        .expect("register");
    registry.start().expect("start");
    assert!(registry.contains("short-lived"));

    assert!(registry.stop("short-lived"));
    assert!(!registry.contains("short-lived"));
    assert!(!registry.stop("short-lived"), "second stop finds nothing");
    assert_eq!(sender.send(1), Err(QueueClosed));
    assert!(sender.is_closed());
}

#[rstest]
fn duplicate_names_are_rejected(registry: HelperThreadRegistry) {
    registry
        .register("dup", RequestQueue::<u32>::new(), |_| Ok::<_, String>(()))
        .expect("first register");
    let err = registry
        .register("dup", RequestQueue::<u32>::new(), |_| Ok::<_, String>(()))
        .expect_err("second register must fail");
    assert!(matches!(err, RegistryError::Duplicate(name) if name == "dup"));
    assert_eq!(registry.len(), 1);
}

#[rstest]
fn stopping_unstarted_worker_drops_its_queue(registry: HelperThreadRegistry) {
    let queue = RequestQueue::<u32>::new();
    let sender = queue.sender();
    registry
        .register("idle", queue, |_| Ok::<_, String>(()))
        .expect("register");

    assert!(registry.stop("idle"));
    assert!(sender.is_closed());
}

#[rstest]
fn start_is_idempotent_and_stop_all_clears(registry: HelperThreadRegistry) {
    for name in ["a", "b", "c"] {
        registry
            .register(name, RequestQueue::<u32>::new(), |_| Ok::<_, String>(()))
            .expect("register");
    }
    assert_eq!(registry.start().expect("start"), 3);
    assert_eq!(registry.start().expect("restart"), 0);

    registry.stop_all();
    assert!(registry.is_empty());
}
