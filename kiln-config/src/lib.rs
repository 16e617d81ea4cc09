//! Domain-driven configuration management for Kiln
//!
//! Configuration is split by functional domain (worker, backplane, cas,
//! logging), loaded from YAML with `KILN_*` environment overrides, and
//! validated per domain before use.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    backplane::{BackplaneConfig, RetryConfig},
    cas::CasConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    worker::WorkerConfig,
    KilnConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
