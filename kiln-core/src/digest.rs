//! Content digests and digest computation

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncReadExt;

use crate::error::{CoreError, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Content fingerprint: lowercase hex hash plus byte length.
///
/// Two byte sequences with equal hashes are treated as identical content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    pub hash: String,
    pub size_bytes: u64,
}

impl Digest {
    pub fn new(hash: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            hash: hash.into(),
            size_bytes,
        }
    }

    /// Whether this digest names the empty blob
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (hash, size) = s
            .split_once('/')
            .ok_or_else(|| CoreError::InvalidDigest(s.to_string()))?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidDigest(s.to_string()));
        }
        let size_bytes = size
            .parse()
            .map_err(|_| CoreError::InvalidDigest(s.to_string()))?;
        Ok(Digest::new(hash.to_ascii_lowercase(), size_bytes))
    }
}

/// Computes digests with the configured hash function (SHA-256).
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestUtil;

impl DigestUtil {
    pub fn new() -> Self {
        Self
    }

    /// Digest an in-memory byte sequence
    pub fn compute(&self, data: &[u8]) -> Digest {
        Digest::new(hex::encode(Sha256::digest(data)), data.len() as u64)
    }

    /// Digest a file by streaming its content
    pub async fn compute_file(&self, path: impl AsRef<Path>) -> Result<Digest> {
        let mut file = tokio::fs::File::open(path.as_ref()).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }

        Ok(Digest::new(hex::encode(hasher.finalize()), size))
    }

    /// Serialize a message canonically and digest the resulting bytes.
    ///
    /// Returns the digest together with the serialized form so callers can
    /// upload exactly the bytes that were hashed.
    pub fn compute_message<T: Serialize>(&self, message: &T) -> Result<(Digest, bytes::Bytes)> {
        let encoded = serde_json::to_vec(message)?;
        let digest = self.compute(&encoded);
        Ok((digest, bytes::Bytes::from(encoded)))
    }

    /// Digest of the empty byte sequence
    pub fn empty(&self) -> Digest {
        self.compute(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_compute_known_value() {
        let digest = DigestUtil::new().compute(b"hello");
        assert_eq!(
            digest.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(digest.size_bytes, 5);
    }

    #[test]
    fn test_empty_digest() {
        let digest = DigestUtil::new().empty();
        assert!(digest.is_empty());
        assert_eq!(
            digest.hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_display_and_parse() {
        let digest = DigestUtil::new().compute(b"abc");
        let rendered = digest.to_string();
        assert!(rendered.ends_with("/3"));
        let parsed: Digest = rendered.parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("nohash".parse::<Digest>().is_err());
        assert!("zz/3".parse::<Digest>().is_err());
        assert!("abcd/notasize".parse::<Digest>().is_err());
    }

    #[tokio::test]
    async fn test_compute_file_matches_in_memory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = vec![7u8; READ_BUFFER_SIZE * 2 + 13];
        file.write_all(&content).unwrap();

        let util = DigestUtil::new();
        let from_file = util.compute_file(file.path()).await.unwrap();
        assert_eq!(from_file, util.compute(&content));
    }

    #[tokio::test]
    async fn test_compute_file_missing() {
        let result = DigestUtil::new()
            .compute_file("/definitely/not/here")
            .await;
        assert!(matches!(result, Err(CoreError::Io(_))));
    }
}
