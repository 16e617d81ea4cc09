//! Lease renewal
//!
//! A [`Poller`] runs two tasks per arm: a periodic task that renews the
//! lease and a one-shot task that fires at the absolute deadline. Either
//! one can end the arm; the failure callback runs at most once.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of one renewal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// The lease was extended
    Renewed,
    /// The backplane refused the renewal or reassigned the unit
    Lost,
    /// The renewal could not be completed (I/O error or timeout)
    Unreachable,
}

/// Runs `on_failure` at most once, whichever task gets there first
struct FailureLatch(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl FailureLatch {
    fn new(on_failure: Box<dyn FnOnce() + Send>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Some(on_failure))))
    }

    fn fire(&self) {
        let on_failure = self.0.lock().take();
        if let Some(on_failure) = on_failure {
            on_failure();
        }
    }
}

/// Cancellable periodic lease renewal with an absolute deadline
pub struct Poller {
    period: Duration,
    interrupt: CancellationToken,
    arm: Mutex<Option<CancellationToken>>,
}

impl Poller {
    /// Create an idle poller.
    ///
    /// Cancelling `interrupt` fails any armed lease.
    pub fn new(period: Duration, interrupt: CancellationToken) -> Self {
        Self {
            period,
            interrupt,
            arm: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether an arm is currently running
    pub fn is_active(&self) -> bool {
        self.arm
            .lock()
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }

    /// Arm the poller, replacing any previous arm.
    ///
    /// `poll` runs every period until it reports [`LeaseStatus::Lost`], the
    /// deadline passes or the poller is interrupted; each of those runs
    /// `on_failure`. [`LeaseStatus::Unreachable`] is tolerated until the
    /// deadline. Must be called within a tokio runtime.
    pub fn resume<P, Fut>(&self, name: &str, mut poll: P, on_failure: Box<dyn FnOnce() + Send>, deadline: Instant)
    where
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = LeaseStatus> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.arm.lock().replace(token.clone()) {
            previous.cancel();
        }

        let latch = FailureLatch::new(on_failure);
        let period = self.period;

        let periodic = {
            let token = token.clone();
            let interrupt = self.interrupt.clone();
            let latch = latch.clone();
            let name = name.to_string();
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = interrupt.cancelled() => {
                            info!(poller = %name, "interrupted");
                            token.cancel();
                            latch.fire();
                            return;
                        }
                        _ = sleep(period) => {}
                    }

                    let status = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = interrupt.cancelled() => {
                            info!(poller = %name, "interrupted during poll");
                            token.cancel();
                            latch.fire();
                            return;
                        }
                        status = poll() => status,
                    };

                    debug!(poller = %name, status = ?status, "completed poll");
                    if status == LeaseStatus::Lost {
                        token.cancel();
                        latch.fire();
                        return;
                    }
                }
            }
        };

        let expiry = {
            let token = token.clone();
            let name = name.to_string();
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = sleep_until(deadline) => {
                        info!(poller = %name, "deadline expired");
                        token.cancel();
                        latch.fire();
                    }
                }
            }
        };

        tokio::spawn(periodic);
        tokio::spawn(expiry);
    }

    /// Stop the current arm without running its failure callback
    pub fn pause(&self) {
        if let Some(token) = self.arm.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.pause();
    }
}
