//! Action results as patched by output capture

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::digest::Digest;

/// Action-cache key: the digest of the action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey(pub Digest);

impl ActionKey {
    pub fn digest(&self) -> &Digest {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Digest> for ActionKey {
    fn from(digest: Digest) -> Self {
        ActionKey(digest)
    }
}

/// Captured output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub digest: Digest,
    pub is_executable: bool,
}

/// Captured output directory, addressed by the digest of its serialized tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDirectory {
    pub path: String,
    pub tree_digest: Digest,
}

/// Result record of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    #[serde(default)]
    pub output_directories: Vec<OutputDirectory>,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub stdout_raw: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_digest: Option<Digest>,
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub stderr_raw: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_digest: Option<Digest>,
}

impl ActionResult {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<Bytes>) -> Self {
        self.stdout_raw = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<Bytes>) -> Self {
        self.stderr_raw = stderr.into();
        self
    }

    pub fn output_file(&self, path: &str) -> Option<&OutputFile> {
        self.output_files.iter().find(|f| f.path == path)
    }

    pub fn output_directory(&self, path: &str) -> Option<&OutputDirectory> {
        self.output_directories.iter().find(|d| d.path == path)
    }
}
