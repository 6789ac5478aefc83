//! Persistence for compiled proving and verification keys.
//!
//! Keys are stored per contract fingerprint. [`FileKeyStore`] writes
//! `<dir>/<fingerprint>.json`; [`MemoryKeyStore`] keeps them in process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::backend::{CompiledKeys, Fingerprint};
use crate::error::{Result, ZkappError};

/// Fingerprint-keyed storage for compiled keys.
pub trait KeyStore: Send + Sync {
    /// `Ok(None)` on a cache miss.
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CompiledKeys>>;

    fn store(&self, fingerprint: &Fingerprint, keys: &CompiledKeys) -> Result<()>;
}

/// JSON files in a directory, one per fingerprint.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CompiledKeys>> {
        let path = self.path_for(fingerprint);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let keys: CompiledKeys =
            serde_json::from_str(&contents).map_err(|e| ZkappError::ConfigParse {
                path: path.clone(),
                source: e,
            })?;
        if keys.verification_key.fingerprint != *fingerprint {
            return Err(ZkappError::KeyStore(format!(
                "{} holds keys for {}",
                path.display(),
                keys.verification_key.fingerprint
            )));
        }
        tracing::debug!(path = %path.display(), "loaded cached keys");
        Ok(Some(keys))
    }

    fn store(&self, fingerprint: &Fingerprint, keys: &CompiledKeys) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(fingerprint);
        let json = serde_json::to_string_pretty(keys)?;
        std::fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "stored compiled keys");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<Fingerprint, CompiledKeys>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CompiledKeys>> {
        Ok(self.keys.lock().get(fingerprint).cloned())
    }

    fn store(&self, fingerprint: &Fingerprint, keys: &CompiledKeys) -> Result<()> {
        self.keys.lock().insert(*fingerprint, keys.clone());
        Ok(())
    }
}
