//! Output capture
//!
//! After a command has run, [`OutputUploader::upload_outputs`] walks the
//! declared output files and directories under the execution root, writes
//! their content into the CAS and patches the [`ActionResult`].
//!
//! Structural problems (a declared file that is a directory, a blob the
//! CAS refuses as too large) are collected rather than failing fast and
//! surface together as [`ExecutionError::PreconditionFailure`] once every
//! output has been visited.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::fs::{FileType, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use kiln_core::{
    ActionResult, Blob, Digest, DigestUtil, Directory, DirectoryNode, FileNode, OutputDirectory,
    OutputFile, PreconditionFailure, Tree,
};
use kiln_interfaces::{CasError, ContentAddressableStorage, Write};

use crate::error::{ExecutionError, Result};

const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(60);

/// A directory after its subtree has been captured
struct WalkedDirectory {
    directory: Directory,
    digest: Digest,
    /// Every directory below this one, depth-first pre-order
    descendants: Vec<(Digest, Directory)>,
}

/// Captures declared outputs into the CAS
pub struct OutputUploader {
    cas: Arc<dyn ContentAddressableStorage>,
    digest_util: DigestUtil,
    write_deadline: Duration,
    inline_std_output_limit: u64,
    interrupt: CancellationToken,
}

impl OutputUploader {
    pub fn new(cas: Arc<dyn ContentAddressableStorage>, digest_util: DigestUtil, interrupt: CancellationToken) -> Self {
        Self {
            cas,
            digest_util,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            inline_std_output_limit: 0,
            interrupt,
        }
    }

    /// How long to wait for a write handle's output sink
    pub fn with_write_deadline(mut self, write_deadline: Duration) -> Self {
        self.write_deadline = write_deadline;
        self
    }

    /// stdout/stderr at or below this many bytes stay inline in the result
    pub fn with_inline_std_output_limit(mut self, limit: u64) -> Self {
        self.inline_std_output_limit = limit;
        self
    }

    /// Capture `output_files` and `output_dirs` (relative to
    /// `execution_root`) and record them on `result`.
    ///
    /// Outputs that were not produced are skipped. Entries captured before
    /// a precondition failure stay on `result`.
    ///
    /// # Errors
    /// - [`ExecutionError::PreconditionFailure`] with every violation found
    /// - [`ExecutionError::Interrupted`] when the interrupt token fires
    /// - CAS or I/O errors other than an oversized entry
    pub async fn upload_outputs(
        &self,
        action_digest: &Digest,
        result: &mut ActionResult,
        execution_root: &Path,
        output_files: &[String],
        output_dirs: &[String],
    ) -> Result<()> {
        let mut failure = PreconditionFailure::new();

        for output_file in output_files {
            self.check_interrupted()?;
            let path = execution_root.join(output_file);
            let Some(metadata) = existing_metadata(&path).await? else {
                debug!(output = %output_file, "output file not produced");
                continue;
            };
            if metadata.is_dir() {
                failure.add_invalid(output_file.as_str(), "An output file was a directory");
                continue;
            }

            let node = self.capture_file(output_file.clone(), &path, &metadata, &mut failure).await?;
            result.output_files.push(OutputFile {
                path: output_file.clone(),
                digest: node.digest,
                is_executable: node.is_executable,
            });
        }

        for output_dir in output_dirs {
            self.check_interrupted()?;
            let path = execution_root.join(output_dir);
            let Some(metadata) = existing_metadata(&path).await? else {
                debug!(output = %output_dir, "output directory not produced");
                continue;
            };
            if !metadata.is_dir() {
                failure.add_invalid(output_dir.as_str(), "An output directory was not a directory");
                continue;
            }

            let tree_digest = self.capture_directory(path, &mut failure).await?;
            result.output_directories.push(OutputDirectory {
                path: output_dir.clone(),
                tree_digest,
            });
        }

        if !failure.is_empty() {
            warn!(
                action = %action_digest,
                violations = failure.len(),
                "output capture completed with precondition violations"
            );
            return Err(ExecutionError::PreconditionFailure {
                action_digest: action_digest.clone(),
                failure,
            });
        }

        self.relocate_std_output(&mut result.stdout_raw, &mut result.stdout_digest)
            .await?;
        self.relocate_std_output(&mut result.stderr_raw, &mut result.stderr_digest)
            .await?;
        Ok(())
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupt.is_cancelled() {
            return Err(ExecutionError::Interrupted);
        }
        Ok(())
    }

    /// Digest and upload one file; an oversized blob becomes a violation
    async fn capture_file(
        &self,
        name: String,
        path: &Path,
        metadata: &Metadata,
        failure: &mut PreconditionFailure,
    ) -> Result<FileNode> {
        let digest = self.digest_util.compute_file(path).await?;
        match self.insert_file(&digest, path).await {
            Ok(()) => {}
            Err(ExecutionError::Cas(CasError::EntryLimit(oversized))) => {
                failure.add_oversized_blob(&oversized);
            }
            Err(e) => return Err(e),
        }

        Ok(FileNode {
            name,
            digest,
            is_executable: is_executable(metadata),
        })
    }

    /// Walk an output directory, upload its tree and return the tree digest
    async fn capture_directory(&self, path: PathBuf, failure: &mut PreconditionFailure) -> Result<Digest> {
        let walked = self.walk_directory(path, failure).await?;

        let mut seen = HashSet::new();
        let children = walked
            .descendants
            .into_iter()
            .filter(|(digest, _)| seen.insert(digest.clone()))
            .map(|(_, directory)| directory)
            .collect();
        let tree = Tree {
            root: walked.directory,
            children,
        };

        let (tree_digest, encoded) = self.digest_util.compute_message(&tree)?;
        match self.cas.put(Blob::with_digest(encoded, tree_digest.clone())).await {
            Ok(()) => {}
            Err(CasError::EntryLimit(oversized)) => failure.add_oversized_blob(&oversized),
            Err(e) => return Err(e.into()),
        }
        Ok(tree_digest)
    }

    /// Capture a directory bottom-up: every child is finished (and its
    /// digest known) before it is referenced from this directory.
    fn walk_directory<'a>(
        &'a self,
        path: PathBuf,
        failure: &'a mut PreconditionFailure,
    ) -> BoxFuture<'a, Result<WalkedDirectory>> {
        async move {
            self.check_interrupted()?;

            let mut entries: Vec<(String, PathBuf, FileType)> = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&path).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                entries.push((name, entry.path(), entry.file_type().await?));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut files = Vec::new();
            let mut directories = Vec::new();
            let mut descendants = Vec::new();

            for (name, entry_path, file_type) in entries {
                self.check_interrupted()?;

                if file_type.is_dir() {
                    let child = self.walk_directory(entry_path, failure).await?;
                    directories.push(DirectoryNode {
                        name,
                        digest: child.digest.clone(),
                    });
                    descendants.push((child.digest, child.directory));
                    descendants.extend(child.descendants);
                    continue;
                }

                // Symlinks are captured as the file they point to
                let Some(metadata) = existing_metadata(&entry_path).await? else {
                    debug!(path = %entry_path.display(), "skipping dangling symlink");
                    continue;
                };
                if metadata.is_dir() {
                    warn!(path = %entry_path.display(), "skipping symlinked directory in output");
                    continue;
                }
                if !metadata.is_file() {
                    debug!(path = %entry_path.display(), "skipping special file in output");
                    continue;
                }

                files.push(self.capture_file(name, &entry_path, &metadata, failure).await?);
            }

            let directory = Directory::new(files, directories);
            let digest = directory.digest(&self.digest_util)?;
            Ok(WalkedDirectory {
                directory,
                digest,
                descendants,
            })
        }
        .boxed()
    }

    /// Stream a file into the CAS through a fresh write session
    async fn insert_file(&self, digest: &Digest, path: &Path) -> Result<()> {
        if digest.is_empty() {
            return Ok(());
        }

        let write = self.cas.get_write(digest, Uuid::new_v4()).await?;
        if write.is_complete() {
            debug!(digest = %digest, "blob already present");
            return Ok(());
        }

        match self.stream_file(write.as_ref(), path).await {
            Ok(()) => Ok(()),
            Err(e) if write.is_complete() => {
                debug!(digest = %digest, error = %e, "ignoring error on completed write");
                Ok(())
            }
            Err(e) => {
                write.reset();
                Err(e)
            }
        }
    }

    async fn stream_file(&self, write: &dyn Write, path: &Path) -> Result<()> {
        let mut output = write.get_output(self.write_deadline).await?;
        let mut file = tokio::fs::File::open(path).await?;

        tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => return Err(ExecutionError::Interrupted),
            copied = tokio::io::copy(&mut file, &mut output) => {
                copied.map_err(classify_io_error)?;
            }
        }

        output.shutdown().await.map_err(classify_io_error)?;
        Ok(())
    }

    /// Move inline stdout/stderr above the inline limit into the CAS
    async fn relocate_std_output(&self, raw: &mut Bytes, digest: &mut Option<Digest>) -> Result<()> {
        if raw.len() as u64 <= self.inline_std_output_limit {
            return Ok(());
        }

        let blob = Blob::new(raw.clone(), &self.digest_util);
        let blob_digest = blob.digest().clone();
        self.cas.put(blob).await?;
        *raw = Bytes::new();
        *digest = Some(blob_digest);
        Ok(())
    }
}

/// Metadata following symlinks, or `None` when nothing exists at `path`
async fn existing_metadata(path: &Path) -> Result<Option<Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}

/// Sinks report store errors through `io::Error`; recover the entry limit
fn classify_io_error(err: io::Error) -> ExecutionError {
    let oversized = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<CasError>())
        .and_then(|inner| match inner {
            CasError::EntryLimit(digest) => Some(digest.clone()),
            _ => None,
        });

    match oversized {
        Some(digest) => ExecutionError::Cas(CasError::EntryLimit(digest)),
        None => ExecutionError::Io(err),
    }
}
