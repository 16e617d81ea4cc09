//! Content-addressable storage for Kiln
//!
//! This crate provides [`MemoryCas`], a thread-safe in-process blob store
//! implementing [`kiln_interfaces::ContentAddressableStorage`], with an
//! entry size limit, resumable write sessions and access statistics.

pub mod stats;
pub mod store;
pub mod write;

// Re-export main types
pub use stats::{CasStats, StatsCollector};
pub use store::MemoryCas;
pub use write::MemoryWrite;

/// Default maximum size of a single entry (2 GiB)
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 2 * 1024 * 1024 * 1024;
