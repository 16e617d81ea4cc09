//! Resilience patterns for Kiln
//!
//! This crate provides the retry policy engine wrapped around backplane
//! mutations: exponential backoff with a jitter fraction, a delay cap and
//! a bounded attempt count, retrying only failures the caller classifies
//! as transient.

pub mod backoff;
pub mod retry;

// Re-export commonly used types
pub use backoff::ExponentialBackoff;
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
