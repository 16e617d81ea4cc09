//! Logging initialisation for Kiln
//!
//! Library crates log through `tracing` (or the `log` facade, which the
//! subscriber bridges). Binaries and tests call one of the initialisers
//! here once; repeated initialisation is a logged no-op.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing};
