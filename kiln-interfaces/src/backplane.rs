//! Backplane interface definitions
//!
//! The backplane is the shared distributed store that coordinates the work
//! queue and operation metadata across workers. Its consistency protocol is
//! its own business; the worker only relies on the operations below.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use kiln_core::{ActionKey, ActionResult, ExecutionStage, Operation, QueueEntry};
use kiln_resilience::Retryable;

/// Status classification reported by a backplane call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackplaneErrorKind {
    Unavailable,
    ConnectionReset,
    DeadlineExceeded,
    NotFound,
    InvalidArgument,
    Internal,
}

impl BackplaneErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackplaneErrorKind::Unavailable => "unavailable",
            BackplaneErrorKind::ConnectionReset => "connection reset",
            BackplaneErrorKind::DeadlineExceeded => "deadline exceeded",
            BackplaneErrorKind::NotFound => "not found",
            BackplaneErrorKind::InvalidArgument => "invalid argument",
            BackplaneErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for BackplaneErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by backplane calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backplane {kind}: {message}")]
pub struct BackplaneError {
    pub kind: BackplaneErrorKind,
    pub message: String,
}

impl BackplaneError {
    pub fn new(kind: BackplaneErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackplaneErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackplaneErrorKind::Internal, message)
    }

    pub fn is_unavailable(&self) -> bool {
        self.kind == BackplaneErrorKind::Unavailable
    }
}

/// The backplane's transient-error predicate
impl Retryable for BackplaneError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackplaneErrorKind::Unavailable
                | BackplaneErrorKind::ConnectionReset
                | BackplaneErrorKind::DeadlineExceeded
        )
    }
}

pub type BackplaneResult<T> = Result<T, BackplaneError>;

/// Shared queue and state store
///
/// Implementations must tolerate concurrent calls from many worker tasks;
/// any serialization happens inside the backplane.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Atomically claim the next queued unit, if any
    ///
    /// Must be cancel-safe: a future dropped before it resolves claims
    /// nothing, since the matcher abandons an in-flight dispatch on interrupt.
    ///
    /// # Returns
    /// `Ok(None)` when the queue had nothing to hand out
    async fn dispatch_operation(&self) -> BackplaneResult<Option<QueueEntry>>;

    /// Return a claimed unit to the queue for other workers
    async fn reject_operation(&self, entry: &QueueEntry) -> BackplaneResult<()>;

    /// Renew the lease on a unit, reporting the stage it is in
    ///
    /// # Arguments
    /// * `entry` - The claimed unit
    /// * `stage` - Current stage; `Queued` hands the unit back early
    /// * `extend_by` - Requested lease extension
    ///
    /// # Returns
    /// `false` when the lease was rejected or the unit reassigned
    async fn poll_lease(
        &self,
        entry: &QueueEntry,
        stage: ExecutionStage,
        extend_by: Duration,
    ) -> BackplaneResult<bool>;

    /// Prevent an action from being dispatched again
    async fn blacklist_action(&self, action_id: &str) -> BackplaneResult<()>;

    /// Publish an operation record
    async fn put_operation(&self, operation: &Operation) -> BackplaneResult<bool>;

    /// Store a result in the action cache
    async fn put_action_result(&self, key: &ActionKey, result: &ActionResult) -> BackplaneResult<()>;
}
