//! Error types for the execution core

use thiserror::Error;

use kiln_core::{CoreError, Digest, PreconditionFailure};
use kiln_interfaces::{BackplaneError, CasError};
use kiln_resilience::RetryError;

pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Execution core errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Backplane error: {0}")]
    Backplane(#[from] BackplaneError),

    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared outputs that could not be captured, as one batch
    #[error("Precondition failure for action {action_digest}: {failure}")]
    PreconditionFailure {
        action_digest: Digest,
        failure: PreconditionFailure,
    },

    #[error("Interrupted")]
    Interrupted,
}

impl ExecutionError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ExecutionError::Interrupted)
    }

    /// The violation list, when this is a precondition failure
    pub fn precondition_failure(&self) -> Option<&PreconditionFailure> {
        match self {
            ExecutionError::PreconditionFailure { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

// Exhausted or fatal retries surface the last backplane failure
impl From<RetryError<BackplaneError>> for ExecutionError {
    fn from(err: RetryError<BackplaneError>) -> Self {
        Self::Backplane(err.into_inner())
    }
}
