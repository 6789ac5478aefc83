use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::contract::MethodCircuit;
use crate::crypto::PublicKey;
use crate::encoding::hex_bytes;
use crate::error::{Result, ZkappError};
use crate::field::FieldElement;
use crate::transaction::{Mutation, Precondition};

/// SHA-256 identity of a compiled contract definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &hex::encode(self.0)[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = ZkappError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|err| ZkappError::Encoding(format!("invalid fingerprint: {err}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ZkappError::Encoding("fingerprint must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Public artifact that checks proofs; stored on the zkapp account at deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub fingerprint: Fingerprint,
    /// Backend-specific key bytes.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Private artifact that generates proofs for a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingKey {
    pub fingerprint: Fingerprint,
    pub contract: String,
    /// Method circuits the key was compiled from.
    pub circuits: BTreeMap<String, MethodCircuit>,
    /// Backend-specific key bytes.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Output of compiling a contract definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledKeys {
    pub verification_key: VerificationKey,
    pub proving_key: ProvingKey,
}

/// Key bytes produced by a backend's setup step.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub verification: Vec<u8>,
    pub proving: Vec<u8>,
}

/// Private inputs to one method proof.
#[derive(Debug, Clone)]
pub struct Witness {
    pub args: Vec<FieldElement>,
    pub snapshot: Vec<FieldElement>,
}

/// What a method proof publicly commits to: the account, the method and the
/// concrete preconditions and mutations of the account update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputs {
    pub target: PublicKey,
    pub method: String,
    pub balance_change: i64,
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
}

impl PublicInputs {
    /// Canonical byte layout:
    ///
    /// ```text
    /// target (32) | method_len (u32 BE) | method | balance_change (i64 BE)
    ///   | n_pre (u32 BE)
    ///   | n_pre x [tag (u8) | slot (u32 BE) | value (32)]
    ///   | n_mut (u32 BE) | n_mut x [slot (u32 BE) | value (32)]
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            32 + 4 + self.method.len() + 8 + 8 + 37 * self.preconditions.len() + 36 * self.mutations.len(),
        );
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(&(self.method.len() as u32).to_be_bytes());
        out.extend_from_slice(self.method.as_bytes());
        out.extend_from_slice(&self.balance_change.to_be_bytes());

        out.extend_from_slice(&(self.preconditions.len() as u32).to_be_bytes());
        for precondition in &self.preconditions {
            let (tag, slot, value) = match precondition {
                Precondition::StateEquals { slot, value } => (0u8, *slot, value),
                Precondition::StateGreaterThan { slot, bound } => (1u8, *slot, bound),
                Precondition::StateLessThan { slot, bound } => (2u8, *slot, bound),
            };
            out.push(tag);
            out.extend_from_slice(&(slot as u32).to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }

        out.extend_from_slice(&(self.mutations.len() as u32).to_be_bytes());
        for mutation in &self.mutations {
            out.extend_from_slice(&(mutation.slot as u32).to_be_bytes());
            out.extend_from_slice(&mutation.value.to_be_bytes());
        }
        out
    }
}

/// Every proving system backend must implement this trait.
///
/// Randomness stays inside [`ProvingBackend::prove`]; [`ProvingBackend::verify`]
/// must be a pure, deterministic function of its inputs.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Short identifier, e.g. "transcript".
    fn name(&self) -> &'static str;

    /// Derive verification and proving key material for a contract's circuits.
    async fn setup(
        &self,
        fingerprint: &Fingerprint,
        circuits: &BTreeMap<String, MethodCircuit>,
    ) -> Result<KeyMaterial>;

    /// Produce a proof that `witness` satisfies `circuit` and yields `public_inputs`.
    async fn prove(
        &self,
        proving_key: &ProvingKey,
        circuit: &MethodCircuit,
        witness: &Witness,
        public_inputs: &PublicInputs,
    ) -> Result<Vec<u8>>;

    /// Check a proof against a verification key and public inputs.
    fn verify(
        &self,
        verification_key: &VerificationKey,
        public_inputs: &PublicInputs,
        proof: &[u8],
    ) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> PublicInputs {
        PublicInputs {
            target: PublicKey::from_bytes([1u8; 32]),
            method: "update".into(),
            balance_change: 0,
            preconditions: vec![Precondition::StateEquals {
                slot: 0,
                value: FieldElement::from(1),
            }],
            mutations: vec![Mutation {
                slot: 0,
                value: FieldElement::from(5),
            }],
        }
    }

    #[test]
    fn test_public_inputs_layout() {
        let bytes = inputs().to_bytes();
        assert_eq!(bytes.len(), 32 + 4 + 6 + 8 + 4 + 37 + 4 + 36);
        assert_eq!(&bytes[32..36], &6u32.to_be_bytes());
        assert_eq!(&bytes[36..42], b"update");
        assert_eq!(&bytes[42..50], &0i64.to_be_bytes());
        // precondition tag follows the count
        assert_eq!(bytes[54], 0);
        assert_eq!(bytes[bytes.len() - 1], 5);
    }

    #[test]
    fn test_public_inputs_bind_mutation_values() {
        let mut other = inputs();
        other.mutations[0].value = FieldElement::from(4);
        assert_ne!(inputs().to_bytes(), other.to_bytes());
    }

    #[test]
    fn test_public_inputs_bind_balance_change() {
        let mut other = inputs();
        other.balance_change = -1;
        assert_ne!(inputs().to_bytes(), other.to_bytes());
    }

    #[test]
    fn test_fingerprint_serde_hex() {
        let fp = Fingerprint([0xAB; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
