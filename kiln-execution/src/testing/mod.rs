//! Testing utilities for kiln-execution
//!
//! - `mocks` - mockall doubles for the backplane, CAS and write handles
//! - `backplane` - a scripted in-memory backplane that records every call
//!
//! Enabled for this crate's own tests and, for downstream crates, through
//! the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! kiln-execution = { path = "../kiln-execution", features = ["testing"] }
//! ```

pub mod backplane;
pub mod mocks;

pub use backplane::InMemoryBackplane;
