//! Account keys and signatures.
//!
//! Accounts are identified by ed25519 public keys. Keys and signatures are
//! hex-encoded on the wire.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ZkappError};

/// Length of an encoded signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// An account address: the raw bytes of an ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check `signature` over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|err| ZkappError::Signature {
            update: None,
            reason: format!("invalid public key {self}: {err}"),
        })?;
        let bytes: [u8; SIGNATURE_LEN] =
            signature.try_into().map_err(|_| ZkappError::Signature {
                update: None,
                reason: format!(
                    "signature must be {SIGNATURE_LEN} bytes, got {}",
                    signature.len()
                ),
            })?;
        key.verify(message, &Signature::from_bytes(&bytes))
            .map_err(|err| ZkappError::Signature {
                update: None,
                reason: format!("signature verification failed for {self}: {err}"),
            })
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..12])
    }
}

impl FromStr for PublicKey {
    type Err = ZkappError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|err| ZkappError::Encoding(format!("invalid public key encoding: {err}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ZkappError::Encoding(format!("public key must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A signing keypair for an account.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&secret),
        }
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|err| ZkappError::Encoding(format!("invalid secret key encoding: {err}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ZkappError::Encoding(format!("secret key must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"commitment");
        assert_eq!(signature.len(), SIGNATURE_LEN);
        keypair.public_key().verify(b"commitment", &signature).unwrap();
        assert!(keypair.public_key().verify(b"other", &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_length() {
        let keypair = Keypair::generate();
        let err = keypair.public_key().verify(b"m", &[0u8; 10]).unwrap_err();
        assert!(matches!(err, ZkappError::Signature { .. }));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = Keypair::generate().public_key();
        let parsed: PublicKey = pk.to_hex().parse().unwrap();
        assert_eq!(parsed, pk);
        assert!("abcd".parse::<PublicKey>().is_err());
        assert!("zz".parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_secret_hex_restores_same_key() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }
}
