//! Test doubles shared by unit tests in this crate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::backend::{
    Fingerprint, KeyMaterial, ProvingBackend, ProvingKey, PublicInputs, VerificationKey, Witness,
};
use crate::contract::{ContractDefinition, MethodCircuit, MethodDecl, ParamType};
use crate::error::Result;

/// Proof = SHA-256(key data || public inputs). Counts setup calls.
#[derive(Debug, Default)]
pub(crate) struct DigestBackend {
    pub setups: AtomicUsize,
}

impl DigestBackend {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn setup_count(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn tag(key: &[u8], inputs: &PublicInputs) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(inputs.to_bytes());
        hasher.finalize().to_vec()
    }
}

#[async_trait]
impl ProvingBackend for DigestBackend {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn setup(
        &self,
        fingerprint: &Fingerprint,
        _circuits: &BTreeMap<String, MethodCircuit>,
    ) -> Result<KeyMaterial> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(KeyMaterial {
            verification: fingerprint.0.to_vec(),
            proving: fingerprint.0.to_vec(),
        })
    }

    async fn prove(
        &self,
        proving_key: &ProvingKey,
        _circuit: &MethodCircuit,
        _witness: &Witness,
        public_inputs: &PublicInputs,
    ) -> Result<Vec<u8>> {
        Ok(Self::tag(&proving_key.data, public_inputs))
    }

    fn verify(
        &self,
        verification_key: &VerificationKey,
        public_inputs: &PublicInputs,
        proof: &[u8],
    ) -> bool {
        Self::tag(&verification_key.data, public_inputs) == proof
    }
}

/// One slot `x`; `set_to(v)` asserts `x == 3` then writes `v`.
pub(crate) fn expects_three() -> ContractDefinition {
    let mut def = ContractDefinition::new("ExpectsThree");
    def.declare_state(&["x"]).expect("state");
    def.declare_methods(vec![MethodDecl::new("set_to", [ParamType::Field], |ctx, args| {
        let x = ctx.get("x")?;
        let three = ctx.constant(3u64);
        ctx.assert_equals(x, three)?;
        ctx.set("x", args[0])
    })])
    .expect("methods");
    def
}
