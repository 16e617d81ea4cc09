//! Core domain models and types for Kiln
//!
//! This crate contains the fundamental types shared by the worker-side
//! execution core: content digests and blobs, platforms and execution
//! policies, queue entries and operations, action results, output trees
//! and precondition failures. It has minimal dependencies and defines the
//! domain language of the worker.

pub mod blob;
pub mod digest;
pub mod error;
pub mod operation;
pub mod platform;
pub mod precondition;
pub mod queue;
pub mod result;
pub mod tree;

// Re-export commonly used types at the crate root
pub use blob::Blob;
pub use digest::{Digest, DigestUtil};
pub use error::{CoreError, Result};
pub use operation::{ExecutionStage, Operation};
pub use platform::{ExecutionPolicy, ExecutionWrapper, Platform, Property, EXECUTION_POLICY_PROPERTY};
pub use precondition::{PreconditionFailure, Violation, ViolationType};
pub use queue::{Action, Command, ExecuteEntry, QueueEntry, QueuedOperation};
pub use result::{ActionKey, ActionResult, OutputDirectory, OutputFile};
pub use tree::{Directory, DirectoryNode, FileNode, Tree};
