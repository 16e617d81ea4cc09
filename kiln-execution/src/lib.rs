//! Kiln Execution Core
//!
//! The worker-side machinery between the backplane queue and the stage
//! that actually runs a command:
//!
//! - [`DispatchMatcher`] claims units whose platform this worker satisfies
//! - [`Poller`] keeps a claimed unit's lease alive until a deadline
//! - [`ActiveOperations`] guards against duplicate claims in this process
//! - [`OutputUploader`] captures declared outputs into the CAS
//! - [`ShardWorkerContext`] composes them behind [`WorkerContext`]

pub mod active;
pub mod context;
pub mod error;
pub mod matcher;
pub mod outputs;
pub mod poller;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use active::ActiveOperations;
pub use context::{CasInsertionPolicy, ShardWorkerContext, WorkerContext};
pub use error::{ExecutionError, Result};
pub use matcher::{DispatchMatcher, MatchEvent, MatchListener};
pub use outputs::OutputUploader;
pub use poller::{LeaseStatus, Poller};
