//! Merkle directory trees
//!
//! A [`Directory`] lists its files and the digests of its child
//! directories. Entries are kept sorted by name so that a directory's
//! digest depends only on its content.

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DigestUtil};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub digest: Digest,
    pub is_executable: bool,
}

/// Reference from a parent directory to a child directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub name: String,
    pub digest: Digest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub files: Vec<FileNode>,
    #[serde(default)]
    pub directories: Vec<DirectoryNode>,
}

impl Directory {
    /// Build a directory from unordered entries
    pub fn new(mut files: Vec<FileNode>, mut directories: Vec<DirectoryNode>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        directories.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files, directories }
    }

    pub fn digest(&self, digest_util: &DigestUtil) -> Result<Digest> {
        Ok(digest_util.compute_message(self)?.0)
    }

    pub fn file(&self, name: &str) -> Option<&FileNode> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn directory(&self, name: &str) -> Option<&DirectoryNode> {
        self.directories.iter().find(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// A root directory plus every descendant directory it references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub root: Directory,
    #[serde(default)]
    pub children: Vec<Directory>,
}

impl Tree {
    /// Resolve a child directory referenced from anywhere in the tree
    pub fn find_child(&self, digest: &Digest, digest_util: &DigestUtil) -> Result<Option<&Directory>> {
        for child in &self.children {
            if &child.digest(digest_util)? == digest {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }
}
