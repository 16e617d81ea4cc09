//! In-memory content-addressable store

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use kiln_core::{Blob, Digest};
use kiln_interfaces::{CasError, CasResult, ContentAddressableStorage, Write};

use crate::stats::{CasStats, StatsCollector};
use crate::write::{BlobMap, MemoryWrite};
use crate::DEFAULT_MAX_ENTRY_SIZE;

/// Thread-safe in-process CAS
pub struct MemoryCas {
    blobs: BlobMap,
    writes: Mutex<HashMap<(Digest, Uuid), Weak<MemoryWrite>>>,
    max_entry_size: u64,
    stats: Arc<StatsCollector>,
}

impl MemoryCas {
    /// Create a store with the default entry size limit
    pub fn new() -> Self {
        Self::with_max_entry_size(DEFAULT_MAX_ENTRY_SIZE)
    }

    /// Create a store refusing entries above `max_entry_size` bytes (0 = unlimited)
    pub fn with_max_entry_size(max_entry_size: u64) -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            writes: Mutex::new(HashMap::new()),
            max_entry_size,
            stats: Arc::new(StatsCollector::new()),
        }
    }

    pub fn max_entry_size(&self) -> u64 {
        self.max_entry_size
    }

    fn exceeds_limit(&self, digest: &Digest) -> bool {
        self.max_entry_size > 0 && digest.size_bytes > self.max_entry_size
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Write sessions still open: some caller holds the handle and it is not complete
    pub fn active_writes(&self) -> usize {
        let mut writes = self.writes.lock();
        prune_writes(&mut writes);
        writes.len()
    }

    pub fn stats(&self) -> CasStats {
        let blobs = self.blobs.read();
        let total_bytes = blobs.values().map(|b| b.len() as u64).sum();
        self.stats.snapshot(blobs.len(), total_bytes)
    }
}

fn prune_writes(writes: &mut HashMap<(Digest, Uuid), Weak<MemoryWrite>>) {
    writes.retain(|_, write| write.upgrade().is_some_and(|write| !write.is_complete()));
}

impl Default for MemoryCas {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentAddressableStorage for MemoryCas {
    async fn contains(&self, digest: &Digest) -> CasResult<bool> {
        Ok(self.blobs.read().contains_key(digest))
    }

    async fn find_missing_blobs(&self, digests: &[Digest]) -> CasResult<Vec<Digest>> {
        let blobs = self.blobs.read();
        Ok(digests
            .iter()
            .filter(|digest| !digest.is_empty() && !blobs.contains_key(*digest))
            .cloned()
            .collect())
    }

    async fn get(&self, digest: &Digest) -> CasResult<Option<Blob>> {
        let found = self.blobs.read().get(digest).cloned();
        match found {
            Some(data) => {
                self.stats.record_hit();
                Ok(Some(Blob::with_digest(data, digest.clone())))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    async fn put(&self, blob: Blob) -> CasResult<()> {
        if self.exceeds_limit(blob.digest()) {
            self.stats.record_rejected();
            warn!("Refusing blob {}: exceeds entry limit of {} bytes", blob.digest(), self.max_entry_size);
            return Err(CasError::EntryLimit(blob.digest().clone()));
        }

        let digest = blob.digest().clone();
        self.blobs.write().insert(digest.clone(), blob.into_data());
        self.stats.record_put();
        debug!("Stored blob {}", digest);
        Ok(())
    }

    async fn get_write(&self, digest: &Digest, session_id: Uuid) -> CasResult<Arc<dyn Write>> {
        let mut writes = self.writes.lock();
        prune_writes(&mut writes);

        let key = (digest.clone(), session_id);
        if let Some(write) = writes.get(&key).and_then(Weak::upgrade) {
            return Ok(write);
        }

        let write = Arc::new(MemoryWrite::new(
            digest.clone(),
            session_id,
            self.blobs.clone(),
            self.stats.clone(),
            self.max_entry_size,
        ));
        if !write.is_complete() {
            writes.insert(key, Arc::downgrade(&write));
        }
        Ok(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::DigestUtil;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_put_then_get_returns_identical_bytes() {
        let cas = MemoryCas::new();
        let blob = Blob::new(&b"round trip"[..], &DigestUtil::new());
        let digest = blob.digest().clone();

        cas.put(blob).await.unwrap();

        let fetched = cas.get(&digest).await.unwrap().unwrap();
        assert_eq!(fetched.data().as_ref(), b"round trip");
        assert!(cas.contains(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_over_limit_is_rejected() {
        let cas = MemoryCas::with_max_entry_size(4);
        let blob = Blob::new(&b"too large"[..], &DigestUtil::new());
        let digest = blob.digest().clone();

        let err = cas.put(blob).await.unwrap_err();
        assert!(matches!(err, CasError::EntryLimit(d) if d == digest));
        assert!(cas.is_empty());
        assert_eq!(cas.stats().rejected_puts, 1);
    }

    #[tokio::test]
    async fn test_find_missing_blobs() {
        let cas = MemoryCas::new();
        let util = DigestUtil::new();
        let present = Blob::new(&b"present"[..], &util);
        let present_digest = present.digest().clone();
        cas.put(present).await.unwrap();

        let absent = util.compute(b"absent");
        let missing = cas
            .find_missing_blobs(&[present_digest, util.empty(), absent.clone()])
            .await
            .unwrap();
        assert_eq!(missing, vec![absent]);
    }

    #[tokio::test]
    async fn test_get_write_is_idempotent_per_session() {
        let cas = MemoryCas::new();
        let digest = DigestUtil::new().compute(b"content");
        let session = Uuid::new_v4();

        let a = cas.get_write(&digest, session).await.unwrap();
        let b = cas.get_write(&digest, session).await.unwrap();
        let other = cas.get_write(&digest, Uuid::new_v4()).await.unwrap();

        let mut out = a.get_output(Duration::from_secs(1)).await.unwrap();
        out.write_all(b"cont").await.unwrap();
        assert_eq!(b.committed_size(), 4);
        assert_eq!(other.committed_size(), 0);
    }

    #[tokio::test]
    async fn test_finished_write_sessions_are_released() {
        let cas = MemoryCas::new();
        let util = DigestUtil::new();

        for i in 0..100 {
            let content = format!("output file {i}");
            let digest = util.compute(content.as_bytes());
            let write = cas.get_write(&digest, Uuid::new_v4()).await.unwrap();
            let mut out = write.get_output(Duration::from_secs(1)).await.unwrap();
            out.write_all(content.as_bytes()).await.unwrap();
            out.shutdown().await.unwrap();
        }

        assert_eq!(cas.len(), 100);
        assert_eq!(cas.active_writes(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_write_session_is_released() {
        let cas = MemoryCas::new();
        let digest = DigestUtil::new().compute(b"never finished");

        let write = cas.get_write(&digest, Uuid::new_v4()).await.unwrap();
        let mut out = write.get_output(Duration::from_secs(1)).await.unwrap();
        out.write_all(b"never").await.unwrap();
        write.reset();
        assert_eq!(cas.active_writes(), 1);

        drop(out);
        drop(write);
        assert_eq!(cas.active_writes(), 0);
    }

    #[tokio::test]
    async fn test_write_for_existing_content_is_complete() {
        let cas = MemoryCas::new();
        let blob = Blob::new(&b"already here"[..], &DigestUtil::new());
        let digest = blob.digest().clone();
        cas.put(blob).await.unwrap();

        let write = cas.get_write(&digest, Uuid::new_v4()).await.unwrap();
        assert!(write.is_complete());
    }

    #[tokio::test]
    async fn test_completed_write_is_readable() {
        let cas = MemoryCas::new();
        let digest = DigestUtil::new().compute(b"streamed");

        let write = cas.get_write(&digest, Uuid::new_v4()).await.unwrap();
        let mut out = write.get_output(Duration::from_secs(1)).await.unwrap();
        out.write_all(b"streamed").await.unwrap();

        let blob = cas.get(&digest).await.unwrap().unwrap();
        assert_eq!(blob.data().as_ref(), b"streamed");

        let stats = cas.stats();
        assert_eq!(stats.total_puts, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_bytes, 8);
    }
}
