//! Network configuration.
//!
//! Loaded from a JSON file such as `zkapp.config.json`; every field has a
//! default, so a partial file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZkappError};

/// Endpoint value that selects the in-process ledger.
pub const LOCAL_ENDPOINT: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ledger JSON-RPC URL, or `local`.
    pub endpoint: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub inclusion_timeout_ms: u64,
    /// Attempts in the retry-with-refresh loop, including the first.
    pub max_attempts: u32,
    pub fee: u64,
    pub account_creation_fee: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: LOCAL_ENDPOINT.to_string(),
            request_timeout_ms: 10_000,
            poll_interval_ms: 1_000,
            inclusion_timeout_ms: 600_000,
            max_attempts: 3,
            fee: 10_000_000,
            account_creation_fee: 1_000_000_000,
        }
    }
}

impl NetworkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ZkappError::ConfigNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| ZkappError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ZkappError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.endpoint == LOCAL_ENDPOINT
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_millis(self.inclusion_timeout_ms)
    }
}
