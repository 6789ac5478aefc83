use std::collections::BTreeMap;

use rand::RngCore;
use sha2::{Digest, Sha256};

use zkapp_core::backend::{Fingerprint, PublicInputs};
use zkapp_core::contract::MethodCircuit;
use zkapp_core::error::Result;

use crate::serializer::TranscriptProof;

const KEY_DOMAIN: &[u8] = b"zkapp.transcript.key.v1";
const PROOF_DOMAIN: &[u8] = b"zkapp.transcript.proof.v1";

/// SHA-256 transcript with length-prefixed, labelled absorbs.
struct Transcript {
    hasher: Sha256,
}

impl Transcript {
    fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    fn absorb(&mut self, label: &str, bytes: &[u8]) {
        self.hasher.update((label.len() as u32).to_be_bytes());
        self.hasher.update(label.as_bytes());
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
    }

    fn finish(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

/// Key bound to the contract fingerprint and the exact circuits compiled.
pub fn derive_key(
    fingerprint: &Fingerprint,
    circuits: &BTreeMap<String, MethodCircuit>,
) -> Result<[u8; 32]> {
    let mut transcript = Transcript::new(KEY_DOMAIN);
    transcript.absorb("fingerprint", &fingerprint.0);
    transcript.absorb("circuits", &serde_json::to_vec(circuits)?);
    Ok(transcript.finish())
}

fn tag(key: &[u8], nonce: &[u8; 32], inputs: &PublicInputs) -> [u8; 32] {
    let mut transcript = Transcript::new(PROOF_DOMAIN);
    transcript.absorb("key", key);
    transcript.absorb("nonce", nonce);
    transcript.absorb("public_inputs", &inputs.to_bytes());
    transcript.finish()
}

/// Tag `inputs` under a fresh random nonce.
pub fn prove(key: &[u8], inputs: &PublicInputs) -> TranscriptProof {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    TranscriptProof {
        tag: tag(key, &nonce, inputs),
        nonce,
    }
}

pub fn verify(key: &[u8], inputs: &PublicInputs, proof: &TranscriptProof) -> bool {
    tag(key, &proof.nonce, inputs) == proof.tag
}
