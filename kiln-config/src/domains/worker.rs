//! Worker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use kiln_core::{ExecutionPolicy, Platform};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_unique, Validatable};

/// Settings for one worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name reported to the backplane
    pub name: String,

    /// Properties this worker advertises for matching
    pub platform: Platform,

    /// Execution policies; each is also advertised as a platform property
    pub execution_policies: Vec<ExecutionPolicy>,

    /// Period between lease renewals
    #[serde(with = "crate::domains::utils::serde_duration_millis")]
    pub operation_poll_period: Duration,

    /// Timeout of a single lease poll, also the extension requested per poll
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub poll_timeout: Duration,

    /// Largest blob inlined into a result
    pub inline_content_limit: usize,

    /// stdout/stderr at or below this size stay inline; 0 always relocates
    pub inline_std_output_limit: usize,

    pub input_fetch_stage_width: usize,

    pub execute_stage_width: usize,

    /// 0 = unset
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub default_action_timeout: Duration,

    /// 0 = unset
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub maximum_action_timeout: Duration,

    /// How long to wait for a CAS write output
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub write_deadline: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            platform: Platform::default(),
            execution_policies: Vec::new(),
            operation_poll_period: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(30),
            inline_content_limit: 1024 * 1024,
            inline_std_output_limit: 0,
            input_fetch_stage_width: num_cpus::get(),
            execute_stage_width: num_cpus::get(),
            default_action_timeout: Duration::ZERO,
            maximum_action_timeout: Duration::ZERO,
            write_deadline: Duration::from_secs(60),
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;

        validate_positive(
            self.operation_poll_period.as_millis(),
            "operation_poll_period",
            self.domain_name(),
        )?;
        validate_positive(self.poll_timeout.as_secs(), "poll_timeout", self.domain_name())?;
        validate_positive(self.write_deadline.as_secs(), "write_deadline", self.domain_name())?;
        validate_positive(
            self.input_fetch_stage_width,
            "input_fetch_stage_width",
            self.domain_name(),
        )?;
        validate_positive(self.execute_stage_width, "execute_stage_width", self.domain_name())?;

        for property in &self.platform.properties {
            validate_required_string(&property.name, "platform property name", self.domain_name())?;
        }

        for policy in &self.execution_policies {
            validate_required_string(&policy.name, "execution policy name", self.domain_name())?;
        }
        validate_unique(
            self.execution_policies.iter().map(|p| p.name.as_str()),
            "execution policy",
            self.domain_name(),
        )?;

        if !self.default_action_timeout.is_zero()
            && !self.maximum_action_timeout.is_zero()
            && self.default_action_timeout > self.maximum_action_timeout
        {
            return Err(self.validation_error(format!(
                "default_action_timeout ({:?}) exceeds maximum_action_timeout ({:?})",
                self.default_action_timeout, self.maximum_action_timeout
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}

fn default_worker_name() -> String {
    "kiln-worker".to_string()
}
