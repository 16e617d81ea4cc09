//! Backplane client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use kiln_resilience::RetryPolicy;

use crate::error::ConfigResult;
use crate::validation::{validate_fraction, validate_positive, Validatable};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackplaneConfig {
    /// Retry policy for backplane mutations
    pub retry: RetryConfig,
}

/// Exponential backoff knobs for retried backplane calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.jitter,
            self.max_attempts,
        )
    }
}

impl Validatable for BackplaneConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()
    }

    fn domain_name(&self) -> &'static str {
        "backplane"
    }
}

impl Validatable for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.initial_delay_ms, "initial_delay_ms", self.domain_name())?;
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;
        validate_fraction(self.jitter, "jitter", self.domain_name())?;

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(self.validation_error(format!(
                "max_delay_ms ({}) must be at least initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }

        if self.multiplier < 1.0 {
            return Err(self.validation_error(format!(
                "multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "backplane.retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_backplane_policy() {
        assert_eq!(RetryConfig::default().to_policy(), RetryPolicy::backplane());
    }

    #[test]
    fn test_retry_validation() {
        let mut config = RetryConfig::default();
        assert!(config.validate().is_ok());

        config.multiplier = 0.5;
        assert!(config.validate().is_err());

        config = RetryConfig {
            max_delay_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
