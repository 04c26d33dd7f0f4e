//! Flow-control gate in front of the receive loop.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    closed: bool,
}

/// Blocks the receive loop while reads are paused.
///
/// Closing the gate releases every waiter for good; it is reopened when the
/// consumer starts again.
#[derive(Debug, Default)]
pub(crate) struct FlowGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl FlowGate {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pause(&self) { self.state().paused = true; }

    pub(crate) fn resume(&self) {
        self.state().paused = false;
        self.changed.notify_all();
    }

    pub(crate) fn is_paused(&self) -> bool { self.state().paused }

    pub(crate) fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.paused = false;
        drop(state);
        self.changed.notify_all();
    }

    pub(crate) fn reopen(&self) { *self.state() = GateState::default(); }

    /// Wait until reads may proceed. Returns `false` once closed.
    pub(crate) fn wait_open(&self) -> bool {
        let state = self
            .changed
            .wait_while(self.state(), |s| s.paused && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        !state.closed
    }

    /// Sleep for `delay` unless closed first. Returns `false` once closed.
    pub(crate) fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut state = self.state();
        while !state.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn resume_releases_paused_waiter() {
        let gate = Arc::new(FlowGate::default());
        gate.pause();
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_open())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        gate.resume();
        assert!(waiter.join().expect("waiter"));
    }

    #[test]
    fn close_interrupts_sleep() {
        let gate = Arc::new(FlowGate::default());
        let sleeper = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.sleep(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        gate.close();
        assert!(!sleeper.join().expect("sleeper"));
        assert!(!gate.wait_open());
    }

    #[test]
    fn sleep_elapses_when_open() { assert!(FlowGate::default().sleep(Duration::from_millis(5))); }
}
