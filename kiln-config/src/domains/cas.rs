//! Content-addressable storage configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// Largest blob accepted as a single entry (0 = unlimited)
    pub max_entry_size_bytes: u64,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            max_entry_size_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl Validatable for CasConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_entry_size_bytes == 0 {
            log::warn!("cas.max_entry_size_bytes is 0; entry size is unlimited");
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "cas"
    }
}
