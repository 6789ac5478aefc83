//! Compiling contract definitions and proving method calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::backend::{
    CompiledKeys, Fingerprint, ProvingBackend, ProvingKey, PublicInputs, VerificationKey, Witness,
};
use crate::contract::ContractDefinition;
use crate::error::{Result, ZkappError};
use crate::field::FieldElement;
use crate::key_cache::KeyStore;
use crate::transaction::AccountUpdate;

/// Front end over a [`ProvingBackend`] with per-fingerprint memoization.
pub struct Prover {
    backend: Arc<dyn ProvingBackend>,
    key_store: Option<Arc<dyn KeyStore>>,
    compiled: Mutex<HashMap<Fingerprint, CompiledKeys>>,
}

impl Prover {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self {
            backend,
            key_store: None,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Persist compiled keys through `store` and reuse them across processes.
    pub fn with_key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    pub fn backend(&self) -> Arc<dyn ProvingBackend> {
        Arc::clone(&self.backend)
    }

    /// Compile `definition` into verification and proving keys.
    ///
    /// Deterministic for identical definitions. Results are memoized by
    /// fingerprint in memory and, when configured, in the key store.
    pub async fn compile(&self, definition: &ContractDefinition) -> Result<CompiledKeys> {
        if !definition.is_frozen() {
            return Err(ZkappError::Compilation(format!(
                "contract '{}' has no declared methods",
                definition.name()
            )));
        }
        let fingerprint = definition.fingerprint()?;

        let memoized = self.compiled.lock().get(&fingerprint).cloned();
        if let Some(keys) = memoized {
            tracing::debug!(contract = definition.name(), %fingerprint, "compile cache hit");
            return Ok(keys);
        }
        if let Some(store) = &self.key_store {
            if let Some(keys) = store.load(&fingerprint)? {
                tracing::debug!(contract = definition.name(), %fingerprint, "loaded keys from store");
                self.compiled.lock().insert(fingerprint, keys.clone());
                return Ok(keys);
            }
        }

        let started = Instant::now();
        let circuits = definition.circuits();
        let material = self
            .backend
            .setup(&fingerprint, &circuits)
            .await
            .map_err(|err| match err {
                ZkappError::Compilation(_) => err,
                other => ZkappError::Compilation(other.to_string()),
            })?;
        let keys = CompiledKeys {
            verification_key: VerificationKey {
                fingerprint,
                data: material.verification,
            },
            proving_key: ProvingKey {
                fingerprint,
                contract: definition.name().to_string(),
                circuits,
                data: material.proving,
            },
        };
        if let Some(store) = &self.key_store {
            store.store(&fingerprint, &keys)?;
        }
        self.compiled.lock().insert(fingerprint, keys.clone());
        tracing::info!(
            contract = definition.name(),
            %fingerprint,
            backend = self.backend.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiled contract"
        );
        Ok(keys)
    }

    /// Prove that `update`'s mutations follow from `snapshot`.
    ///
    /// Fails with `PreconditionFailure` when the snapshot violates one of the
    /// method's assertions or does not reproduce the update's recorded
    /// preconditions and mutations.
    pub async fn prove(
        &self,
        proving_key: &ProvingKey,
        update: &AccountUpdate,
        snapshot: &[FieldElement],
    ) -> Result<Vec<u8>> {
        let (method, public_inputs) = match (update.method_name(), update.public_inputs()) {
            (Some(method), Some(inputs)) => (method, inputs),
            _ => {
                return Err(ZkappError::ProofGeneration(format!(
                    "update for {} is not a method call",
                    update.target
                )))
            }
        };
        let circuit = proving_key.circuits.get(method).ok_or_else(|| {
            ZkappError::ProofGeneration(format!(
                "proving key for '{}' has no method '{method}'",
                proving_key.contract
            ))
        })?;
        let witness = update.witness.as_ref().ok_or_else(|| {
            ZkappError::ProofGeneration(format!(
                "update calling '{method}' carries no witness"
            ))
        })?;

        let failure = |assertion: String| ZkappError::PreconditionFailure {
            update: None,
            method: method.to_string(),
            assertion,
        };

        let evaluation = circuit.evaluate(&witness.args, snapshot)?;
        if !evaluation.is_satisfied() {
            return Err(failure(evaluation.violations.join("; ")));
        }
        if let Some(unmet) = update.preconditions.iter().find(|p| !p.holds(snapshot)) {
            return Err(failure(unmet.describe(&circuit.slots)));
        }
        if evaluation.preconditions != update.preconditions
            || evaluation.mutations != update.mutations
        {
            return Err(failure(
                "snapshot does not reproduce the update's preconditions and mutations".into(),
            ));
        }

        let started = Instant::now();
        let proof = self
            .backend
            .prove(
                proving_key,
                circuit,
                &Witness {
                    args: witness.args.clone(),
                    snapshot: snapshot.to_vec(),
                },
                &public_inputs,
            )
            .await?;
        tracing::debug!(
            method,
            target = %update.target,
            proof_bytes = proof.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated proof"
        );
        Ok(proof)
    }

    /// Pure check of `proof` against `verification_key`.
    pub fn verify(
        &self,
        verification_key: &VerificationKey,
        public_inputs: &PublicInputs,
        proof: &[u8],
    ) -> bool {
        self.backend.verify(verification_key, public_inputs, proof)
    }
}

impl std::fmt::Debug for Prover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prover")
            .field("backend", &self.backend.name())
            .field("key_store", &self.key_store.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::key_cache::MemoryKeyStore;
    use crate::testing::{expects_three, DigestBackend};
    use crate::transaction::{Authorization, MethodWitness, UpdateKind};

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    /// Build a call update the way the transaction builder does.
    fn call(def: &Arc<ContractDefinition>, snapshot: &[FieldElement], arg: u64) -> AccountUpdate {
        let circuit = &def.method("set_to").unwrap().circuit;
        let eval = circuit.evaluate(&[fe(arg)], snapshot).unwrap();
        AccountUpdate {
            target: Keypair::generate().public_key(),
            kind: UpdateKind::Call {
                method: "set_to".into(),
            },
            balance_change: 0,
            preconditions: eval.preconditions,
            mutations: eval.mutations,
            verification_key: None,
            authorization: Authorization::None,
            witness: Some(MethodWitness {
                contract: Arc::clone(def),
                args: vec![fe(arg)],
                snapshot: snapshot.to_vec(),
            }),
        }
    }

    #[tokio::test]
    async fn test_compile_is_memoized() {
        let backend = DigestBackend::shared();
        let prover = Prover::new(backend.clone());
        let def = expects_three();
        let first = prover.compile(&def).await.unwrap();
        let second = prover.compile(&expects_three()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.setup_count(), 1);
        assert_eq!(first.verification_key.fingerprint, def.fingerprint().unwrap());
    }

    #[tokio::test]
    async fn test_compile_uses_key_store_across_provers() {
        let store: Arc<MemoryKeyStore> = Arc::new(MemoryKeyStore::new());
        let backend = DigestBackend::shared();
        let a = Prover::new(backend.clone()).with_key_store(store.clone());
        let keys = a.compile(&expects_three()).await.unwrap();
        let b = Prover::new(backend.clone()).with_key_store(store.clone());
        assert_eq!(b.compile(&expects_three()).await.unwrap(), keys);
        assert_eq!(backend.setup_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_compile_rejects_undeclared_methods() {
        let prover = Prover::new(DigestBackend::shared());
        let mut def = ContractDefinition::new("Empty");
        def.declare_state(&["x"]).unwrap();
        let err = prover.compile(&def).await.unwrap_err();
        assert!(matches!(err, ZkappError::Compilation(_)));
    }

    #[tokio::test]
    async fn test_prove_fails_when_snapshot_violates_assertion() {
        let prover = Prover::new(DigestBackend::shared());
        let def = Arc::new(expects_three());
        let keys = prover.compile(&def).await.unwrap();

        let update = call(&def, &[fe(2)], 9);
        let err = prover
            .prove(&keys.proving_key, &update, &[fe(2)])
            .await
            .unwrap_err();
        match err {
            ZkappError::PreconditionFailure { method, assertion, .. } => {
                assert_eq!(method, "set_to");
                assert!(assertion.contains("x == 3"), "{assertion}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_prove_succeeds_when_snapshot_matches() {
        let prover = Prover::new(DigestBackend::shared());
        let def = Arc::new(expects_three());
        let keys = prover.compile(&def).await.unwrap();

        let update = call(&def, &[fe(3)], 9);
        let proof = prover
            .prove(&keys.proving_key, &update, &[fe(3)])
            .await
            .unwrap();
        let inputs = update.public_inputs().unwrap();
        assert!(prover.verify(&keys.verification_key, &inputs, &proof));

        let mut tampered = inputs.clone();
        tampered.mutations[0].value = fe(10);
        assert!(!prover.verify(&keys.verification_key, &tampered, &proof));
    }

    #[tokio::test]
    async fn test_prove_rejects_mismatched_mutations() {
        let prover = Prover::new(DigestBackend::shared());
        let def = Arc::new(expects_three());
        let keys = prover.compile(&def).await.unwrap();

        let mut update = call(&def, &[fe(3)], 9);
        update.mutations[0].value = fe(1);
        let err = prover
            .prove(&keys.proving_key, &update, &[fe(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, ZkappError::PreconditionFailure { .. }));
    }
}
