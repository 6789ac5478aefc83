//! Transcript backend for zkapp-core.
//!
//! A development proving system: a proof is a random 32-byte nonce plus a
//! SHA-256 transcript tag binding the compiled contract's key, the nonce and
//! the update's public inputs. Proving re-evaluates the method circuit on the
//! witness and refuses to tag public inputs the witness does not produce.
//! Proofs are 64 bytes (`nonce | tag`).
//!
//! ⚠️ **Security note:** the verification key carries the same secret the
//! prover tags with. This backend attests to what an honest client computed;
//! it is not zero-knowledge and not sound against a malicious prover. Use it
//! for local ledgers and tests.

mod circuit;
mod prover;
pub mod serializer;

use std::collections::BTreeMap;

use async_trait::async_trait;

use zkapp_core::backend::{
    Fingerprint, KeyMaterial, ProvingBackend, ProvingKey, PublicInputs, VerificationKey, Witness,
};
use zkapp_core::contract::MethodCircuit;
use zkapp_core::error::{Result, ZkappError};

pub use serializer::{TranscriptProof, PROOF_LEN};

/// Transcript proving backend. Stateless; cheap to share.
#[derive(Debug, Default, Clone, Copy)]
pub struct TranscriptBackend;

impl TranscriptBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvingBackend for TranscriptBackend {
    fn name(&self) -> &'static str {
        "transcript"
    }

    async fn setup(
        &self,
        fingerprint: &Fingerprint,
        circuits: &BTreeMap<String, MethodCircuit>,
    ) -> Result<KeyMaterial> {
        for (name, circuit) in circuits {
            circuit::check_well_formed(circuit)
                .map_err(|reason| ZkappError::Compilation(format!("method '{name}': {reason}")))?;
        }
        let key = prover::derive_key(fingerprint, circuits)?;
        tracing::debug!(%fingerprint, methods = circuits.len(), "derived transcript key");
        Ok(KeyMaterial {
            verification: key.to_vec(),
            proving: key.to_vec(),
        })
    }

    async fn prove(
        &self,
        proving_key: &ProvingKey,
        circuit: &MethodCircuit,
        witness: &Witness,
        public_inputs: &PublicInputs,
    ) -> Result<Vec<u8>> {
        circuit::check_witness(circuit, witness, public_inputs)
            .map_err(ZkappError::ProofGeneration)?;
        let proof = prover::prove(&proving_key.data, public_inputs);
        Ok(proof.to_bytes().to_vec())
    }

    fn verify(
        &self,
        verification_key: &VerificationKey,
        public_inputs: &PublicInputs,
        proof: &[u8],
    ) -> bool {
        match TranscriptProof::from_bytes(proof) {
            Ok(proof) => prover::verify(&verification_key.data, public_inputs, &proof),
            Err(err) => {
                tracing::debug!(error = %err, "malformed transcript proof");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkapp_core::field::FieldElement;
    use zkapp_core::sample;
    use zkapp_core::{Keypair, Prover};

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    async fn compiled() -> (MethodCircuit, zkapp_core::backend::CompiledKeys) {
        let definition = sample::simple_zkapp().unwrap();
        let prover = Prover::new(std::sync::Arc::new(TranscriptBackend::new()));
        let keys = prover.compile(&definition).await.unwrap();
        (definition.method("update").unwrap().circuit.clone(), keys)
    }

    fn inputs_for(circuit: &MethodCircuit, y: u64, x: u64) -> (Witness, PublicInputs) {
        let eval = circuit.evaluate(&[fe(y)], &[fe(x)]).unwrap();
        (
            Witness {
                args: vec![fe(y)],
                snapshot: vec![fe(x)],
            },
            PublicInputs {
                target: Keypair::generate().public_key(),
                method: "update".into(),
                balance_change: 0,
                preconditions: eval.preconditions,
                mutations: eval.mutations,
            },
        )
    }

    #[tokio::test]
    async fn test_prove_and_verify() {
        let (circuit, keys) = compiled().await;
        let backend = TranscriptBackend::new();
        let (witness, inputs) = inputs_for(&circuit, 4, 1);
        let proof = backend
            .prove(&keys.proving_key, &circuit, &witness, &inputs)
            .await
            .unwrap();
        assert_eq!(proof.len(), PROOF_LEN);
        assert!(backend.verify(&keys.verification_key, &inputs, &proof));
    }

    #[tokio::test]
    async fn test_proofs_are_randomized_but_both_verify() {
        let (circuit, keys) = compiled().await;
        let backend = TranscriptBackend::new();
        let (witness, inputs) = inputs_for(&circuit, 4, 1);
        let a = backend.prove(&keys.proving_key, &circuit, &witness, &inputs).await.unwrap();
        let b = backend.prove(&keys.proving_key, &circuit, &witness, &inputs).await.unwrap();
        assert_ne!(a, b);
        assert!(backend.verify(&keys.verification_key, &inputs, &a));
        assert!(backend.verify(&keys.verification_key, &inputs, &b));
    }

    #[tokio::test]
    async fn test_verify_is_deterministic_and_binds_inputs() {
        let (circuit, keys) = compiled().await;
        let backend = TranscriptBackend::new();
        let (witness, inputs) = inputs_for(&circuit, 4, 1);
        let proof = backend.prove(&keys.proving_key, &circuit, &witness, &inputs).await.unwrap();

        for _ in 0..3 {
            assert!(backend.verify(&keys.verification_key, &inputs, &proof));
        }
        let mut forged = inputs.clone();
        forged.mutations[0].value = fe(4);
        assert!(!backend.verify(&keys.verification_key, &forged, &proof));
        assert!(!backend.verify(&keys.verification_key, &inputs, &proof[..32]));
    }

    #[tokio::test]
    async fn test_prove_refuses_inputs_the_witness_does_not_produce() {
        let (circuit, keys) = compiled().await;
        let backend = TranscriptBackend::new();
        let (witness, mut inputs) = inputs_for(&circuit, 4, 1);
        inputs.mutations[0].value = fe(4);
        let err = backend
            .prove(&keys.proving_key, &circuit, &witness, &inputs)
            .await
            .unwrap_err();
        assert!(matches!(err, ZkappError::ProofGeneration(_)));
    }

    #[tokio::test]
    async fn test_keys_differ_per_contract() {
        let (_, keys) = compiled().await;
        let mut other = zkapp_core::ContractDefinition::new("Other");
        other.declare_state(&["x"]).unwrap();
        other.declare_methods(vec![]).unwrap();
        let prover = Prover::new(std::sync::Arc::new(TranscriptBackend::new()));
        let other_keys = prover.compile(&other).await.unwrap();
        assert_ne!(keys.verification_key.data, other_keys.verification_key.data);
    }
}
