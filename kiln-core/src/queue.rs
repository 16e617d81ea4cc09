//! Queue entries and queued-operation records

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::digest::Digest;
use crate::platform::Platform;
use crate::tree::Tree;

/// Identity of a requested execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteEntry {
    pub operation_name: String,
    pub action_digest: Digest,
    #[serde(default)]
    pub skip_cache_lookup: bool,
}

/// Claim ticket for one unit of work, issued by the backplane.
///
/// Immutable once issued; identity is the operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub execute_entry: ExecuteEntry,
    /// Digest of the fully-resolved [`QueuedOperation`] in the CAS
    pub queued_operation_digest: Digest,
    /// Platform the unit requires
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub requeue_attempts: u32,
}

impl QueueEntry {
    pub fn new(
        operation_name: impl Into<String>,
        action_digest: Digest,
        queued_operation_digest: Digest,
        platform: Platform,
    ) -> Self {
        Self {
            execute_entry: ExecuteEntry {
                operation_name: operation_name.into(),
                action_digest,
                skip_cache_lookup: false,
            },
            queued_operation_digest,
            platform,
            requeue_attempts: 0,
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.execute_entry.operation_name
    }

    pub fn action_digest(&self) -> &Digest {
        &self.execute_entry.action_digest
    }
}

/// Action to be executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub command_digest: Digest,
    pub input_root_digest: Digest,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub do_not_cache: bool,
}

/// Command line and declared outputs of an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub arguments: Vec<String>,
    #[serde(default)]
    pub environment_variables: Vec<(String, String)>,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub output_directories: Vec<String>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub working_directory: String,
}

/// Fully-resolved operation stored in the CAS for a queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub action: Action,
    pub command: Command,
    /// Input tree
    pub tree: Tree,
}
