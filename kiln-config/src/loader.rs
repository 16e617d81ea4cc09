//! Configuration loading and environment variable handling

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::KilnConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "KILN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<KilnConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: KilnConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<KilnConfig> {
        let mut config = KilnConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<KilnConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut KilnConfig) -> ConfigResult<()> {
        if let Ok(name) = self.get_env_var("WORKER_NAME") {
            config.worker.name = name;
        }

        if let Ok(period) = self.get_env_var("POLL_PERIOD_MS") {
            config.worker.operation_poll_period = Duration::from_millis(self.parse("POLL_PERIOD_MS", &period)?);
        }

        if let Ok(timeout) = self.get_env_var("POLL_TIMEOUT_SECONDS") {
            config.worker.poll_timeout = Duration::from_secs(self.parse("POLL_TIMEOUT_SECONDS", &timeout)?);
        }

        if let Ok(size) = self.get_env_var("MAX_ENTRY_SIZE") {
            config.cas.max_entry_size_bytes = self.parse("MAX_ENTRY_SIZE", &size)?;
        }

        if let Ok(attempts) = self.get_env_var("RETRY_MAX_ATTEMPTS") {
            config.backplane.retry.max_attempts = self.parse("RETRY_MAX_ATTEMPTS", &attempts)?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn parse<T>(&self, name: &str, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
