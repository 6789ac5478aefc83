//! Byte layout of transcript proofs.
//!
//! ```text
//! nonce (32) | tag (32)
//! ```

/// Size of a serialized proof in bytes.
pub const PROOF_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptProof {
    pub nonce: [u8; 32],
    pub tag: [u8; 32],
}

impl TranscriptProof {
    pub fn to_bytes(&self) -> [u8; PROOF_LEN] {
        let mut out = [0u8; PROOF_LEN];
        out[..32].copy_from_slice(&self.nonce);
        out[32..].copy_from_slice(&self.tag);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != PROOF_LEN {
            return Err(format!(
                "transcript proof must be {PROOF_LEN} bytes, got {}",
                bytes.len()
            ));
        }
        let mut nonce = [0u8; 32];
        let mut tag = [0u8; 32];
        nonce.copy_from_slice(&bytes[..32]);
        tag.copy_from_slice(&bytes[32..]);
        Ok(Self { nonce, tag })
    }
}
