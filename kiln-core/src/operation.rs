//! Operations and execution stages

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::digest::Digest;
use crate::result::ActionResult;

/// Lifecycle stage of an operation as reported to the backplane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStage {
    Unknown,
    CacheCheck,
    Queued,
    Executing,
    Completed,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Unknown => "UNKNOWN",
            ExecutionStage::CacheCheck => "CACHE_CHECK",
            ExecutionStage::Queued => "QUEUED",
            ExecutionStage::Executing => "EXECUTING",
            ExecutionStage::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-running operation record published to the backplane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub stage: ExecutionStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_digest: Option<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, stage: ExecutionStage) -> Self {
        Self {
            name: name.into(),
            done: false,
            stage,
            action_digest: None,
            result: None,
            error: None,
        }
    }

    pub fn with_action_digest(mut self, digest: Digest) -> Self {
        self.action_digest = Some(digest);
        self
    }

    /// Mark the operation completed with a result
    pub fn complete(mut self, result: ActionResult) -> Self {
        self.stage = ExecutionStage::Completed;
        self.done = true;
        self.result = Some(result);
        self
    }

    /// Mark the operation completed with an error
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.stage = ExecutionStage::Completed;
        self.done = true;
        self.error = Some(error.into());
        self
    }
}
