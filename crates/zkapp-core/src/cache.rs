//! Local store of the last known account records.
//!
//! The cache is the only shared mutable resource in a client. Readers never
//! observe a partially written record: every write replaces the whole entry
//! under the lock, and network I/O happens outside of it.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::account::AccountRecord;
use crate::crypto::PublicKey;
use crate::error::{NetworkError, Result};
use crate::ledger::LedgerClient;

/// How a cached record got into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// Inserted with [`AccountStateCache::seed`] without asking the ledger.
    LocallyAsserted,
    /// Returned by the ledger.
    Fetched,
}

#[derive(Debug, Clone)]
struct CachedAccount {
    record: AccountRecord,
    origin: RecordOrigin,
}

/// Public key -> last known [`AccountRecord`].
#[derive(Debug, Default)]
pub struct AccountStateCache {
    entries: RwLock<HashMap<PublicKey, CachedAccount>>,
}

impl AccountStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record without any network call.
    pub fn seed(&self, record: AccountRecord) {
        tracing::debug!(account = %record.public_key, nonce = record.nonce, "seeding account");
        self.insert(record, RecordOrigin::LocallyAsserted);
    }

    /// Cached record for `public_key`. Never touches the network.
    pub fn get(&self, public_key: &PublicKey) -> Result<AccountRecord> {
        self.entries
            .read()
            .get(public_key)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| NetworkError::NotFound(*public_key).into())
    }

    /// Fetch `public_key` from the ledger and replace the cached entry.
    ///
    /// On failure the existing entry is left untouched.
    pub async fn refresh(
        &self,
        ledger: &dyn LedgerClient,
        public_key: &PublicKey,
    ) -> Result<AccountRecord> {
        let record = ledger.get_account(public_key).await?;
        tracing::debug!(account = %public_key, nonce = record.nonce, "refreshed account");
        self.insert(record.clone(), RecordOrigin::Fetched);
        Ok(record)
    }

    /// Store records the ledger reported as part of an inclusion.
    pub fn store_fetched(&self, records: impl IntoIterator<Item = AccountRecord>) {
        let mut entries = self.entries.write();
        for record in records {
            entries.insert(
                record.public_key,
                CachedAccount {
                    record,
                    origin: RecordOrigin::Fetched,
                },
            );
        }
    }

    pub fn origin(&self, public_key: &PublicKey) -> Option<RecordOrigin> {
        self.entries.read().get(public_key).map(|entry| entry.origin)
    }

    /// Drop the entry for `public_key`, returning whether one existed.
    pub fn invalidate(&self, public_key: &PublicKey) -> bool {
        self.entries.write().remove(public_key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: AccountRecord, origin: RecordOrigin) {
        self.entries
            .write()
            .insert(record.public_key, CachedAccount { record, origin });
    }
}
