//! Resumable write sessions into the in-memory store

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::watch;
use uuid::Uuid;

use kiln_core::{Digest, DigestUtil};
use kiln_interfaces::{CasError, CasResult, Write, WriteOutput};

use crate::stats::StatsCollector;

pub(crate) type BlobMap = Arc<RwLock<HashMap<Digest, Bytes>>>;

/// Write session for one (digest, session id) pair
///
/// Bytes accumulate in a private buffer. The blob is committed to the
/// store once the buffer reaches the declared size and hashes to the
/// digest; completion is then observable through [`Write::completion`].
pub struct MemoryWrite {
    session_id: Uuid,
    max_entry_size: u64,
    state: Arc<WriteState>,
}

struct WriteState {
    digest: Digest,
    buffer: Mutex<Vec<u8>>,
    complete: watch::Sender<bool>,
    blobs: BlobMap,
    stats: Arc<StatsCollector>,
}

impl MemoryWrite {
    pub(crate) fn new(
        digest: Digest,
        session_id: Uuid,
        blobs: BlobMap,
        stats: Arc<StatsCollector>,
        max_entry_size: u64,
    ) -> Self {
        // Content already present (or empty) needs no bytes
        let already_complete = digest.is_empty() || blobs.read().contains_key(&digest);
        let (complete, _) = watch::channel(already_complete);

        Self {
            session_id,
            max_entry_size,
            state: Arc::new(WriteState {
                digest,
                buffer: Mutex::new(Vec::new()),
                complete,
                blobs,
                stats,
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl WriteState {
    fn is_complete(&self) -> bool {
        *self.complete.borrow()
    }

    fn append(&self, data: &[u8]) -> io::Result<usize> {
        if self.is_complete() {
            return Ok(data.len());
        }

        let mut buffer = self.buffer.lock();
        let expected = self.digest.size_bytes;
        if buffer.len() as u64 + data.len() as u64 > expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "write for {} would exceed declared size ({} + {})",
                    self.digest,
                    buffer.len(),
                    data.len()
                ),
            ));
        }

        buffer.extend_from_slice(data);
        if buffer.len() as u64 == expected {
            let content = Bytes::from(std::mem::take(&mut *buffer));
            let actual = DigestUtil::new().compute(&content);
            if actual != self.digest {
                return Err(CasError::DigestMismatch {
                    expected: self.digest.clone(),
                    actual,
                }
                .into());
            }
            self.commit(content);
        }

        Ok(data.len())
    }

    fn commit(&self, content: Bytes) {
        self.blobs.write().insert(self.digest.clone(), content);
        self.stats.record_put();
        self.complete.send_replace(true);
        debug!("Write for {} complete", self.digest);
    }
}

/// Sink returned from [`MemoryWrite::get_output`]
struct MemoryWriteOutput {
    state: Arc<WriteState>,
}

impl AsyncWrite for MemoryWriteOutput {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(self.state.append(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl Write for MemoryWrite {
    fn digest(&self) -> &Digest {
        &self.state.digest
    }

    fn committed_size(&self) -> u64 {
        if self.state.is_complete() {
            self.state.digest.size_bytes
        } else {
            self.state.buffer.lock().len() as u64
        }
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn completion(&self) -> watch::Receiver<bool> {
        self.state.complete.subscribe()
    }

    /// The in-memory sink is available immediately, so `deadline` never elapses
    async fn get_output(&self, _deadline: Duration) -> CasResult<WriteOutput> {
        if self.max_entry_size > 0 && self.state.digest.size_bytes > self.max_entry_size {
            self.state.stats.record_rejected();
            return Err(CasError::EntryLimit(self.state.digest.clone()));
        }

        Ok(Box::pin(MemoryWriteOutput {
            state: self.state.clone(),
        }))
    }

    fn reset(&self) {
        if !self.state.is_complete() {
            self.state.buffer.lock().clear();
        }
    }
}
