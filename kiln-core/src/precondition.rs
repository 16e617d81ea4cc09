//! Precondition violations collected during output capture

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::digest::Digest;

/// Kind of a precondition violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationType {
    /// A declared output has the wrong shape
    Invalid,
    /// A blob could not be made available
    Missing,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::Invalid => "invalid",
            ViolationType::Missing => "missing",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    /// Output path, or `blobs/<digest>` for missing content
    pub subject: String,
    pub description: String,
}

/// Ordered list of violations, surfaced as one batched failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionFailure {
    pub violations: Vec<Violation>,
}

impl PreconditionFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        violation_type: ViolationType,
        subject: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.violations.push(Violation {
            violation_type,
            subject: subject.into(),
            description: description.into(),
        });
    }

    pub fn add_invalid(&mut self, subject: impl Into<String>, description: impl Into<String>) {
        self.add(ViolationType::Invalid, subject, description);
    }

    /// Record a blob that exceeded the CAS entry size limit
    pub fn add_oversized_blob(&mut self, digest: &Digest) {
        self.add(
            ViolationType::Missing,
            format!("blobs/{}", digest),
            "An output could not be uploaded because it exceeded the maximum size of an entry",
        );
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }
}

impl fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{} {}: {}", v.violation_type, v.subject, v.description))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}
