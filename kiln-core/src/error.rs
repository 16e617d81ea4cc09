//! Core error types for Kiln

use thiserror::Error;

/// Core error type for domain-level failures
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O errors while reading content to digest
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors for canonical messages
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A digest string that is not `<hex hash>/<size>`
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
