//! Dispatch matching
//!
//! Pulls candidates from the backplane until one is claimed for execution
//! or the listener accepts an idle tick. A candidate whose platform the
//! worker does not satisfy is rejected back to the queue; a candidate whose
//! operation is already active in this process is discarded.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kiln_core::{Platform, QueueEntry};
use kiln_interfaces::Backplane;

use crate::active::ActiveOperations;
use crate::error::{ExecutionError, Result};

/// Progress notifications delivered around each backplane wait.
///
/// `WaitStart` always precedes `WaitEnd`, which precedes any entry
/// delivered for that wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    WaitStart,
    WaitEnd,
}

/// Receiver of match progress and of the matched unit
#[async_trait]
pub trait MatchListener: Send {
    fn on_event(&mut self, event: MatchEvent);

    /// Offer a claimed unit, or `None` as an idle tick.
    ///
    /// Returns whether the listener took it. A refused unit is requeued; a
    /// refused idle tick makes the matcher wait again.
    async fn on_entry(&mut self, entry: Option<QueueEntry>) -> bool;
}

/// Claims work from the backplane for one worker platform
pub struct DispatchMatcher {
    backplane: Arc<dyn Backplane>,
    active: Arc<ActiveOperations>,
    platform: Platform,
}

impl DispatchMatcher {
    pub fn new(backplane: Arc<dyn Backplane>, active: Arc<ActiveOperations>, platform: Platform) -> Self {
        debug!("will match against platform {}", platform);
        Self {
            backplane,
            active,
            platform,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Run the match loop until a unit is delivered or an idle tick accepted.
    ///
    /// # Errors
    /// [`ExecutionError::Interrupted`] when `interrupt` fires; backplane
    /// errors other than unavailability.
    pub async fn run(&self, listener: &mut dyn MatchListener, interrupt: &CancellationToken) -> Result<()> {
        loop {
            if interrupt.is_cancelled() {
                return Err(ExecutionError::Interrupted);
            }

            listener.on_event(MatchEvent::WaitStart);
            let dispatched = tokio::select! {
                biased;
                _ = interrupt.cancelled() => {
                    listener.on_event(MatchEvent::WaitEnd);
                    return Err(ExecutionError::Interrupted);
                }
                dispatched = self.backplane.dispatch_operation() => dispatched,
            };
            listener.on_event(MatchEvent::WaitEnd);

            let candidate = match dispatched {
                Ok(candidate) => candidate,
                // Unavailability reads as "nothing to hand out"
                Err(e) if e.is_unavailable() => {
                    debug!(error = %e, "backplane unavailable during dispatch");
                    None
                }
                Err(e) => return Err(e.into()),
            };

            if interrupt.is_cancelled() {
                if let Some(entry) = candidate {
                    info!(operation = %entry.operation_name(), "interrupted after claim, rejecting");
                    if let Err(e) = self.reject(&entry).await {
                        warn!(operation = %entry.operation_name(), error = %e, "could not return claimed operation");
                    }
                }
                return Err(ExecutionError::Interrupted);
            }

            if self.offer(candidate, listener).await? {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
    }

    /// Returns whether the loop is finished
    async fn offer(&self, candidate: Option<QueueEntry>, listener: &mut dyn MatchListener) -> Result<bool> {
        let Some(entry) = candidate else {
            return Ok(listener.on_entry(None).await);
        };

        if !self.platform.satisfies(&entry.platform) {
            debug!(
                operation = %entry.operation_name(),
                required = %entry.platform,
                "rejecting unsatisfiable operation"
            );
            self.reject(&entry).await?;
            return Ok(false);
        }

        let operation_name = entry.operation_name().to_string();
        if !self.active.insert_if_absent(entry.clone()) {
            warn!(operation = %operation_name, "matched duplicate operation");
            return Ok(false);
        }

        if !listener.on_entry(Some(entry)).await {
            info!(operation = %operation_name, "listener refused operation, requeueing");
            self.active.requeue(self.backplane.as_ref(), &operation_name).await;
        }
        Ok(true)
    }

    async fn reject(&self, entry: &QueueEntry) -> Result<()> {
        match self.backplane.reject_operation(entry).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unavailable() => {
                warn!(operation = %entry.operation_name(), error = %e, "could not reject operation");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
