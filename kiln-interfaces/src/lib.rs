//! # Kiln Interfaces
//!
//! Contracts for the external collaborators the worker consumes.
//!
//! The worker never talks to a concrete queue or store directly. It holds
//! trait objects for:
//!
//! - [`Backplane`] - the shared queue and operation metadata store
//! - [`ContentAddressableStorage`] - blob storage addressed by digest
//! - [`Write`] - a resumable upload session into the CAS
//!
//! Error types carry enough classification for callers to decide between
//! retrying, downgrading to a precondition violation, or failing.

pub mod backplane;
pub mod cas;

// Re-export commonly used types
pub use backplane::{Backplane, BackplaneError, BackplaneErrorKind, BackplaneResult};
pub use cas::{CasError, CasResult, ContentAddressableStorage, Write, WriteOutput};
