//! CLI command implementations for zkapp.
//!
//! Each module corresponds to a subcommand (`zkapp <command>`).

pub mod account;
pub mod compile;
pub mod keygen;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use zkapp_core::key_cache::FileKeyStore;
use zkapp_core::{NetworkConfig, Prover};
use zkapp_transcript::TranscriptBackend;

/// Load `path` if it exists, then apply the `--endpoint` override.
pub fn load_config(path: &Path, endpoint: Option<String>) -> Result<NetworkConfig> {
    let mut config = if path.exists() {
        NetworkConfig::load(path)?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        NetworkConfig::default()
    };
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    Ok(config)
}

/// A transcript prover that caches keys under `key_dir`.
pub fn prover(key_dir: &Path) -> Prover {
    Prover::new(Arc::new(TranscriptBackend::new()))
        .with_key_store(Arc::new(FileKeyStore::new(key_dir)))
}
