//! Platforms, platform satisfaction and execution policies

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthetic property name advertising a configured execution policy
pub const EXECUTION_POLICY_PROPERTY: &str = "execution-policy";

/// A single `(name, value)` platform constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered set of platform properties.
///
/// A worker platform satisfies a requirement platform when every required
/// property is present in the worker platform with an equal value. A name
/// may appear more than once (e.g. several execution policies).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, keeping insertion order. Exact duplicates are ignored.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_property(Property::new(name, value));
        self
    }

    pub fn add_property(&mut self, property: Property) {
        if !self.properties.contains(&property) {
            self.properties.push(property);
        }
    }

    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.properties
            .iter()
            .any(|p| p.name == name && p.value == value)
    }

    /// Whether this platform satisfies every property in `requirements`
    pub fn satisfies(&self, requirements: &Platform) -> bool {
        requirements
            .properties
            .iter()
            .all(|required| self.contains(&required.name, &required.value))
    }

    /// Advertise each execution policy as an `execution-policy` property
    pub fn with_execution_policies<'a>(
        &self,
        policies: impl IntoIterator<Item = &'a ExecutionPolicy>,
    ) -> Platform {
        let mut adjusted = self.clone();
        for policy in policies {
            adjusted.add_property(Property::new(EXECUTION_POLICY_PROPERTY, policy.name.clone()));
        }
        adjusted
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, property) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", property.name, property.value)?;
        }
        write!(f, "}}")
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Platform {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Platform::new(), |platform, (name, value)| {
                platform.with_property(name, value)
            })
    }
}

/// Program that wraps command execution under a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionWrapper {
    pub path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Named execution policy a worker may advertise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<ExecutionWrapper>,
}

impl ExecutionPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wrapper: None,
        }
    }

    pub fn with_wrapper(mut self, path: impl Into<String>, arguments: Vec<String>) -> Self {
        self.wrapper = Some(ExecutionWrapper {
            path: path.into(),
            arguments,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superset_satisfies() {
        let worker: Platform = [("os", "linux"), ("pool", "gpu")].into_iter().collect();
        let requirement: Platform = [("os", "linux"), ("pool", "gpu")].into_iter().collect();
        assert!(worker.satisfies(&requirement));

        let smaller: Platform = [("os", "linux")].into_iter().collect();
        assert!(worker.satisfies(&smaller));
    }

    #[test]
    fn test_missing_property_does_not_satisfy() {
        let worker: Platform = [("os", "linux")].into_iter().collect();
        let requirement: Platform = [("os", "linux"), ("pool", "gpu")].into_iter().collect();
        assert!(!worker.satisfies(&requirement));
    }

    #[test]
    fn test_value_mismatch_does_not_satisfy() {
        let worker: Platform = [("os", "linux")].into_iter().collect();
        let requirement: Platform = [("os", "macos")].into_iter().collect();
        assert!(!worker.satisfies(&requirement));
    }

    #[test]
    fn test_empty_requirement_always_satisfied() {
        assert!(Platform::new().satisfies(&Platform::new()));
        let worker: Platform = [("os", "linux")].into_iter().collect();
        assert!(worker.satisfies(&Platform::new()));
    }

    #[test]
    fn test_execution_policies_become_properties() {
        let worker: Platform = [("os", "linux")].into_iter().collect();
        let policies = vec![
            ExecutionPolicy::new("sandboxed"),
            ExecutionPolicy::new("networked").with_wrapper("/usr/bin/netns", vec![]),
        ];
        let adjusted = worker.with_execution_policies(&policies);

        assert_eq!(adjusted.properties.len(), 3);
        assert!(adjusted.contains(EXECUTION_POLICY_PROPERTY, "sandboxed"));
        assert!(adjusted.contains(EXECUTION_POLICY_PROPERTY, "networked"));

        let requirement = Platform::new().with_property(EXECUTION_POLICY_PROPERTY, "networked");
        assert!(adjusted.satisfies(&requirement));
        assert!(!worker.satisfies(&requirement));
    }

    #[test]
    fn test_display() {
        let platform: Platform = [("os", "linux"), ("arch", "x86_64")].into_iter().collect();
        assert_eq!(platform.to_string(), "{os: linux, arch: x86_64}");
    }
}
