//! Transactions and account updates.
//!
//! A [`Transaction`] is a fee-payer header followed by an ordered list of
//! [`AccountUpdate`]s. Signatures from the fee payer and from
//! signature-authorized updates cover the [`Transaction::commitment`], which
//! hashes everything except the authorizations themselves.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::{PublicInputs, VerificationKey};
use crate::contract::ContractDefinition;
use crate::crypto::PublicKey;
use crate::encoding::hex_bytes;
use crate::error::Result;
use crate::field::FieldElement;

const COMMITMENT_DOMAIN: &[u8] = b"zkapp.transaction.v1";

/// A condition on an account's current state that the ledger checks before
/// applying an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    StateEquals { slot: usize, value: FieldElement },
    StateGreaterThan { slot: usize, bound: FieldElement },
    StateLessThan { slot: usize, bound: FieldElement },
}

impl Precondition {
    pub fn slot(&self) -> usize {
        match self {
            Self::StateEquals { slot, .. }
            | Self::StateGreaterThan { slot, .. }
            | Self::StateLessThan { slot, .. } => *slot,
        }
    }

    /// Whether the condition holds for `state`. Out-of-range slots never hold.
    pub fn holds(&self, state: &[FieldElement]) -> bool {
        let Some(current) = state.get(self.slot()) else {
            return false;
        };
        match self {
            Self::StateEquals { value, .. } => current == value,
            Self::StateGreaterThan { bound, .. } => current > bound,
            Self::StateLessThan { bound, .. } => current < bound,
        }
    }

    /// e.g. `x == 3`, using slot names when available.
    pub fn describe(&self, slots: &[String]) -> String {
        let slot = self.slot();
        let name = slots
            .get(slot)
            .cloned()
            .unwrap_or_else(|| format!("slot{slot}"));
        match self {
            Self::StateEquals { value, .. } => format!("{name} == {value}"),
            Self::StateGreaterThan { bound, .. } => format!("{name} > {bound}"),
            Self::StateLessThan { bound, .. } => format!("{name} < {bound}"),
        }
    }
}

/// New value for one state slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub slot: usize,
    pub value: FieldElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    /// Create and fund a new account from the fee payer's balance.
    Fund,
    /// Attach a verification key and the full initial state.
    Deploy { slot_count: usize },
    /// Invoke a contract method.
    Call { method: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationKind {
    Signature,
    Proof,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Authorization {
    #[default]
    None,
    Signature(#[serde(with = "hex_bytes")] Vec<u8>),
    Proof(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl Authorization {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Private inputs recorded while building a method call. Never encoded.
#[derive(Debug, Clone)]
pub struct MethodWitness {
    pub contract: Arc<ContractDefinition>,
    pub args: Vec<FieldElement>,
    /// Target account state as observed at call time.
    pub snapshot: Vec<FieldElement>,
}

/// A single proposed change to one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub target: PublicKey,
    pub kind: UpdateKind,
    /// Signed balance delta applied to the target.
    pub balance_change: i64,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_key: Option<VerificationKey>,
    #[serde(default)]
    pub authorization: Authorization,
    #[serde(skip)]
    pub witness: Option<MethodWitness>,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    target: &'a PublicKey,
    kind: &'a UpdateKind,
    balance_change: i64,
    preconditions: &'a [Precondition],
    mutations: &'a [Mutation],
    verification_key: Option<&'a VerificationKey>,
}

impl AccountUpdate {
    pub fn required_authorization(&self) -> AuthorizationKind {
        match self.kind {
            UpdateKind::Fund | UpdateKind::Deploy { .. } => AuthorizationKind::Signature,
            UpdateKind::Call { .. } => AuthorizationKind::Proof,
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Call { method } => Some(method),
            _ => None,
        }
    }

    /// What a proof for this update commits to. `None` for non-method updates.
    pub fn public_inputs(&self) -> Option<PublicInputs> {
        self.method_name().map(|method| PublicInputs {
            target: self.target,
            method: method.to_string(),
            balance_change: self.balance_change,
            preconditions: self.preconditions.clone(),
            mutations: self.mutations.clone(),
        })
    }

    fn body(&self) -> UpdateBody<'_> {
        UpdateBody {
            target: &self.target,
            kind: &self.kind,
            balance_change: self.balance_change,
            preconditions: &self.preconditions,
            mutations: &self.mutations,
            verification_key: self.verification_key.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayer {
    pub public_key: PublicKey,
    pub fee: u64,
    /// Fee payer nonce observed at build time.
    pub nonce: u64,
    #[serde(default)]
    pub authorization: Authorization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub fee_payer: FeePayer,
    pub account_updates: Vec<AccountUpdate>,
}

impl Transaction {
    /// SHA-256 over the fee payer header and every update body.
    ///
    /// Authorizations are excluded, so attaching signatures and proofs never
    /// changes the commitment they sign.
    pub fn commitment(&self) -> Result<[u8; 32]> {
        let bodies: Vec<UpdateBody<'_>> =
            self.account_updates.iter().map(AccountUpdate::body).collect();
        let mut hasher = Sha256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(self.fee_payer.public_key.as_bytes());
        hasher.update(self.fee_payer.fee.to_be_bytes());
        hasher.update(self.fee_payer.nonce.to_be_bytes());
        hasher.update(serde_json::to_vec(&bodies)?);
        Ok(hasher.finalize().into())
    }

    /// Wire form sent to the ledger.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Whether every update and the fee payer carry an authorization.
    pub fn is_fully_authorized(&self) -> bool {
        !self.fee_payer.authorization.is_none()
            && self
                .account_updates
                .iter()
                .all(|update| !update.authorization.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    fn sample() -> Transaction {
        Transaction {
            fee_payer: FeePayer {
                public_key: Keypair::generate().public_key(),
                fee: 100,
                nonce: 3,
                authorization: Authorization::None,
            },
            account_updates: vec![AccountUpdate {
                target: Keypair::generate().public_key(),
                kind: UpdateKind::Call {
                    method: "update".into(),
                },
                balance_change: 0,
                preconditions: vec![Precondition::StateEquals {
                    slot: 0,
                    value: fe(1),
                }],
                mutations: vec![Mutation {
                    slot: 0,
                    value: fe(5),
                }],
                verification_key: None,
                authorization: Authorization::None,
                witness: None,
            }],
        }
    }

    #[test]
    fn test_precondition_holds_and_describe() {
        let slots = vec!["x".to_string()];
        let eq = Precondition::StateEquals { slot: 0, value: fe(2) };
        assert!(eq.holds(&[fe(2)]));
        assert!(!eq.holds(&[fe(3)]));
        assert!(!eq.holds(&[]));
        assert_eq!(eq.describe(&slots), "x == 2");

        let gt = Precondition::StateGreaterThan { slot: 0, bound: fe(2) };
        assert!(gt.holds(&[fe(3)]));
        assert!(!gt.holds(&[fe(2)]));

        let lt = Precondition::StateLessThan { slot: 1, bound: fe(2) };
        assert_eq!(lt.describe(&slots), "slot1 < 2");
    }

    #[test]
    fn test_commitment_ignores_authorizations() {
        let tx = sample();
        let before = tx.commitment().unwrap();
        let mut signed = tx.clone();
        signed.fee_payer.authorization = Authorization::Signature(vec![1; 64]);
        signed.account_updates[0].authorization = Authorization::Proof(vec![2; 64]);
        assert_eq!(signed.commitment().unwrap(), before);
        assert!(signed.is_fully_authorized());
        assert!(!tx.is_fully_authorized());
    }

    #[test]
    fn test_commitment_binds_nonce_and_mutations() {
        let tx = sample();
        let mut bumped = tx.clone();
        bumped.fee_payer.nonce += 1;
        assert_ne!(bumped.commitment().unwrap(), tx.commitment().unwrap());

        let mut changed = tx.clone();
        changed.account_updates[0].mutations[0].value = fe(4);
        assert_ne!(changed.commitment().unwrap(), tx.commitment().unwrap());
    }

    #[test]
    fn test_encode_decode_preserves_commitment() {
        let mut tx = sample();
        tx.account_updates[0].authorization = Authorization::Proof(vec![0xAB; 64]);
        let decoded = Transaction::decode(&tx.encode().unwrap()).unwrap();
        assert_eq!(decoded.commitment().unwrap(), tx.commitment().unwrap());
        assert_eq!(decoded.account_updates[0].authorization, tx.account_updates[0].authorization);
        assert!(decoded.account_updates[0].witness.is_none());
    }

    #[test]
    fn test_required_authorization_by_kind() {
        let mut update = sample().account_updates.remove(0);
        assert_eq!(update.required_authorization(), AuthorizationKind::Proof);
        assert!(update.public_inputs().is_some());
        update.kind = UpdateKind::Deploy { slot_count: 1 };
        assert_eq!(update.required_authorization(), AuthorizationKind::Signature);
        assert!(update.public_inputs().is_none());
    }
}
