//! Lease maintenance thread.
//!
//! While a policy is open, outstanding leases are extended to the learned
//! acknowledgement deadline at a random interval below that deadline, so
//! the broker does not redeliver messages still being processed. Leases
//! held past the maximum lease duration are dropped, which may lift flow
//! control, so the thread wakes at least once per that duration.

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};
use rand::Rng;
use tokio::{runtime, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    control::ControlRequest,
    helper::{RequestSender, join_with_timeout},
    lease::LeaseManager,
};

const LEASER_THREAD: &str = "lease maintenance";

pub(super) struct Leaser {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    join_timeout: Duration,
}

impl Leaser {
    pub(super) fn spawn(
        leases: Arc<LeaseManager>,
        requests: RequestSender<ControlRequest>,
        join_timeout: Duration,
        on_expired: impl Fn() + Send + 'static,
    ) -> io::Result<Self> {
        let runtime = runtime::Builder::new_current_thread().enable_time().build()?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = thread::Builder::new()
            .name(LEASER_THREAD.to_owned())
            .spawn(move || runtime.block_on(maintain(&leases, &requests, &on_expired, token)))?;
        Ok(Self {
            shutdown,
            handle,
            join_timeout,
        })
    }

    pub(super) fn stop(self) {
        self.shutdown.cancel();
        join_with_timeout(LEASER_THREAD, self.handle, self.join_timeout);
    }
}

async fn maintain(
    leases: &LeaseManager,
    requests: &RequestSender<ControlRequest>,
    on_expired: &dyn Fn(),
    shutdown: CancellationToken,
) {
    let max_lease = leases.flow_control().max_lease_duration;
    loop {
        let expired = leases.expire();
        for ack_id in &expired {
            warn!("lease exceeded maximum duration; no longer extended: ack_id={ack_id}");
        }
        if !expired.is_empty() {
            on_expired();
        }
        let seconds = leases.ack_deadline();
        let ack_ids = leases.leased_ack_ids();
        if !ack_ids.is_empty() {
            debug!("extending leases: count={}, seconds={seconds}", ack_ids.len());
            if requests
                .send(ControlRequest::ExtendLease { ack_ids, seconds })
                .is_err()
            {
                debug!("control queue closed; lease maintenance exiting");
                return;
            }
        }
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = sleep(snooze(seconds).min(max_lease)) => {}
        }
    }
    debug!("lease maintenance stopped");
}

/// Random pause in `[0, 0.9 * deadline)` seconds.
fn snooze(deadline: u32) -> Duration {
    let upper = f64::from(deadline.max(1)) * 0.9;
    Duration::from_secs_f64(rand::rng().random_range(0.0..upper))
}
