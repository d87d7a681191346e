//! Limits applied to slot allocators and slot lists

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for [`SlotAllocator`](crate::SlotAllocator) and
/// [`SlotList`](crate::SlotList)
///
/// Both limits are unbounded by default. A limit turns table growth beyond it into a
/// [`Error::CapacityExceeded`] failure that leaves the structure untouched.
///
/// ```toml
/// max_slots = 64
/// max_list_len = 64
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotConfig {
    /// Maximum size of an allocator's table
    pub max_slots: Option<usize>,
    /// Maximum length of a slot list
    pub max_list_len: Option<usize>,
}

impl SlotConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("Invalid slot config: {}", e)))
    }

    /// Serialize this configuration to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(format!("Failed to write slot config: {}", e)))
    }
}
