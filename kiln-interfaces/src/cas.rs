//! Content-addressable storage interface definitions

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::watch;
use uuid::Uuid;

use kiln_core::{Blob, Digest};

/// CAS error types
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// The blob is larger than the store accepts for a single entry
    #[error("entry {0} exceeds the maximum entry size")]
    EntryLimit(Digest),

    #[error("blob {0} not found")]
    NotFound(Digest),

    #[error("content does not match digest {expected}: got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("deadline exceeded waiting for write {0}")]
    DeadlineExceeded(Digest),

    #[error("write cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<CasError> for io::Error {
    fn from(err: CasError) -> Self {
        match err {
            CasError::Io(e) => e,
            CasError::DeadlineExceeded(_) => io::Error::new(io::ErrorKind::TimedOut, err),
            CasError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, err),
            other => io::Error::other(other),
        }
    }
}

pub type CasResult<T> = Result<T, CasError>;

/// Byte sink handed out by a [`Write`]
pub type WriteOutput = Pin<Box<dyn AsyncWrite + Send>>;

/// A resumable upload session identified by (digest, session id)
///
/// The write completes once the store has committed as many bytes as the
/// digest declares and the content hashes to it. After an I/O failure the
/// caller must [`reset`](Write::reset) before writing again; partial bytes
/// are never resumed implicitly.
#[async_trait]
pub trait Write: Send + Sync {
    fn digest(&self) -> &Digest;

    /// Bytes accepted so far in this session
    fn committed_size(&self) -> u64;

    fn is_complete(&self) -> bool;

    /// Receiver that observes `true` once the write completes
    fn completion(&self) -> watch::Receiver<bool>;

    /// Obtain the output sink, waiting at most `deadline` for it
    async fn get_output(&self, deadline: Duration) -> CasResult<WriteOutput>;

    /// Discard partial progress
    fn reset(&self);
}

/// Content-addressable blob store
///
/// Blobs are retrieved solely by digest. Implementations must tolerate
/// concurrent handles for distinct digests.
#[async_trait]
pub trait ContentAddressableStorage: Send + Sync {
    async fn contains(&self, digest: &Digest) -> CasResult<bool>;

    /// Digests from `digests` that the store does not hold, in input order
    async fn find_missing_blobs(&self, digests: &[Digest]) -> CasResult<Vec<Digest>>;

    async fn get(&self, digest: &Digest) -> CasResult<Option<Blob>>;

    /// Store a blob
    ///
    /// # Errors
    /// [`CasError::EntryLimit`] when the blob exceeds the entry size limit
    async fn put(&self, blob: Blob) -> CasResult<()>;

    /// Open (or rejoin) the write session for `digest` identified by `session_id`
    async fn get_write(&self, digest: &Digest, session_id: Uuid) -> CasResult<Arc<dyn Write>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion_keeps_kind() {
        let err: io::Error = CasError::Cancelled.into();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);

        let err: io::Error = CasError::DeadlineExceeded(Digest::new("ab", 1)).into();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        let original = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let err: io::Error = CasError::Io(original).into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_entry_limit_recoverable_from_io_error() {
        let digest = Digest::new("ab", 10);
        let err: io::Error = CasError::EntryLimit(digest.clone()).into();
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<CasError>())
            .expect("wrapped cas error");
        assert!(matches!(inner, CasError::EntryLimit(d) if d == &digest));
    }
}
