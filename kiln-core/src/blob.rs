//! In-memory blobs

use bytes::Bytes;

use crate::digest::{Digest, DigestUtil};

/// A byte sequence paired with its digest.
///
/// Use this whenever complete content moves between the worker and the
/// CAS so the digest is computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    digest: Digest,
    data: Bytes,
}

impl Blob {
    /// Create a blob, computing its digest from the content
    pub fn new(data: impl Into<Bytes>, digest_util: &DigestUtil) -> Self {
        let data = data.into();
        let digest = digest_util.compute(&data);
        Self { digest, data }
    }

    /// Create a blob with a trusted, caller-supplied digest. Not checked.
    pub fn with_digest(data: impl Into<Bytes>, digest: Digest) -> Self {
        Self {
            digest,
            data: data.into(),
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Size as declared by the digest
    pub fn size(&self) -> u64 {
        self.digest.size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
