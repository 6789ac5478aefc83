use serde::{Deserialize, Serialize};

use crate::backend::VerificationKey;
use crate::crypto::PublicKey;
use crate::field::FieldElement;

/// The ledger's view of one account.
///
/// `state` has a fixed length once a contract is deployed; it is empty for
/// plain (non-contract) accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub public_key: PublicKey,
    pub balance: u64,
    pub nonce: u64,
    #[serde(default)]
    pub state: Vec<FieldElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_key: Option<VerificationKey>,
}

impl AccountRecord {
    /// A funded account with no contract attached.
    pub fn new(public_key: PublicKey, balance: u64, nonce: u64) -> Self {
        Self {
            public_key,
            balance,
            nonce,
            state: Vec::new(),
            verification_key: None,
        }
    }

    /// Whether a contract has been deployed to this account.
    pub fn is_zkapp(&self) -> bool {
        self.verification_key.is_some()
    }

    /// Value of the slot at `index`, if the account has that many slots.
    pub fn slot(&self, index: usize) -> Option<FieldElement> {
        self.state.get(index).copied()
    }
}
