//! Unified error types for zkapp clients.

use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::PublicKey;
use crate::field::FieldElement;

/// Failures at the network boundary.
///
/// Kept apart from logic errors so callers can drive a retry-with-refresh
/// loop without inspecting error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The ledger has no account for this public key.
    #[error("account not found: {0}")]
    NotFound(PublicKey),

    /// The request did not complete in time.
    #[error("ledger request timed out")]
    Timeout,

    /// Connection, HTTP or protocol-level failure talking to the ledger.
    #[error("ledger transport error: {0}")]
    Transport(String),
}

/// All errors that can occur while building, proving and submitting transactions.
#[derive(Error, Debug)]
pub enum ZkappError {
    // --- Declaration and compilation ---

    /// The contract definition is malformed (duplicate slots, undeclared slots,
    /// unconstrained state reads, declaration order violations).
    #[error("invalid contract declaration for {contract}: {reason}")]
    Declaration { contract: String, reason: String },

    /// The constraint system could not be built from the definition.
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// A method was invoked with arguments or state that do not fit its declaration.
    #[error("invalid call to method '{method}': {reason}")]
    InvalidCall { method: String, reason: String },

    // --- Authorization ---

    /// A recorded assertion does not hold against the state snapshot.
    #[error("precondition failed{} in method '{method}': {assertion}", update_label(.update))]
    PreconditionFailure {
        update: Option<usize>,
        method: String,
        assertion: String,
    },

    /// A signature is missing or invalid.
    #[error("signature error{}: {reason}", update_label(.update))]
    Signature { update: Option<usize>, reason: String },

    /// The proving backend failed to produce a proof.
    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    // --- Submission ---

    /// The ledger could not be reached or returned no record.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The fee payer nonce no longer matches the ledger (optimistic-concurrency conflict).
    #[error("stale nonce for fee payer {fee_payer}: transaction used {used}, ledger expects {expected}")]
    StaleNonce {
        fee_payer: PublicKey,
        used: u64,
        expected: u64,
    },

    /// The ledger refused the transaction at submission.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// A submission failed in transit and the fee payer nonce has since moved:
    /// the transaction may have been applied, so it is not rebuilt.
    #[error("transaction from {fee_payer} with nonce {nonce} may already be applied")]
    Indeterminate { fee_payer: PublicKey, nonce: u64 },

    // --- Post-inclusion ---

    /// Observed on-chain state does not match the caller's expectation.
    #[error("state mismatch on {account} slot '{slot}': expected {expected}, observed {observed}")]
    Verification {
        account: PublicKey,
        slot: String,
        expected: FieldElement,
        observed: FieldElement,
    },

    // --- Configuration and key storage ---

    /// The configuration file was not found.
    #[error("config file not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file exists but contains invalid JSON.
    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing cached proving/verification keys failed.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Malformed encoded value (hex key, field element literal, ...).
    #[error("invalid encoding: {0}")]
    Encoding(String),

    // --- General ---

    /// A filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A catch-all for errors from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZkappError {
    /// Whether rebuilding against refreshed state and resubmitting may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleNonce { .. }
                | Self::Network(NetworkError::Timeout)
                | Self::Network(NetworkError::Transport(_))
        )
    }

    pub(crate) fn declaration(contract: &str, reason: impl Into<String>) -> Self {
        Self::Declaration {
            contract: contract.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the index of the failing account update, if not already set.
    pub(crate) fn at_update(self, index: usize) -> Self {
        match self {
            Self::PreconditionFailure {
                update: None,
                method,
                assertion,
            } => Self::PreconditionFailure {
                update: Some(index),
                method,
                assertion,
            },
            Self::Signature {
                update: None,
                reason,
            } => Self::Signature {
                update: Some(index),
                reason,
            },
            other => other,
        }
    }
}

fn update_label(update: &Option<usize>) -> String {
    match update {
        Some(index) => format!(" (account update #{index})"),
        None => String::new(),
    }
}

/// Alias for `Result<T, ZkappError>`.
pub type Result<T> = std::result::Result<T, ZkappError>;
