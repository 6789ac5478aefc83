//! The network boundary: fetching accounts, submitting transactions and
//! polling for inclusion.

pub mod http;
pub mod local;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::AccountRecord;
use crate::crypto::PublicKey;
use crate::error::Result;
use crate::transaction::Transaction;

pub use http::HttpLedgerClient;
pub use local::LocalLedger;

/// Opaque identifier returned by submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionHandle(pub String);

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-side status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InclusionStatus {
    Pending,
    /// Final; carries the post-inclusion records of every touched account.
    Included { accounts: Vec<AccountRecord> },
    Rejected { reason: String },
}

/// Request/response access to a ledger.
///
/// `send_transaction` fails with `StaleNonce` when the fee payer nonce does
/// not match the ledger and with `Rejected` when the ledger refuses the
/// transaction outright.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_account(&self, public_key: &PublicKey) -> Result<AccountRecord>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<TransactionHandle>;

    async fn query_inclusion(&self, handle: &TransactionHandle) -> Result<InclusionStatus>;
}
