//! Field elements of the proof system's scalar domain.
//!
//! All on-chain state and method arithmetic live in the BN254 scalar field.
//! Values travel as decimal strings on the wire and as 32-byte big-endian
//! words inside commitments and proof transcripts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ZkappError;

/// An element of the scalar field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldElement(Fr);

impl FieldElement {
    /// The additive identity.
    pub fn zero() -> Self {
        Self(Fr::from(0u64))
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(Fr::from(1u64))
    }

    pub fn add(&self, other: &Self) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self(self.0 - other.0)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self(self.0 * other.0)
    }

    /// 32-byte big-endian canonical encoding.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    /// Decode a canonical 32-byte big-endian value. Rejects values >= the modulus.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Option<Self> {
        if BigUint::from_bytes_be(bytes) >= modulus() {
            return None;
        }
        Some(Self(Fr::from_be_bytes_mod_order(bytes)))
    }

    fn to_biguint(self) -> BigUint {
        BigUint::from_bytes_be(&self.to_be_bytes())
    }
}

fn modulus() -> BigUint {
    BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be())
}

/// Elements compare by their canonical integer representation in `[0, p)`.
impl Ord for FieldElement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.into_bigint().cmp(&other.0.into_bigint())
    }
}

impl PartialOrd for FieldElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for FieldElement {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({self})")
    }
}

impl FromStr for FieldElement {
    type Err = ZkappError;

    /// Parse a decimal literal. Values outside `[0, p)` are rejected rather than reduced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .ok_or_else(|| ZkappError::Encoding(format!("invalid field element literal: '{s}'")))?;
        if value >= modulus() {
            return Err(ZkappError::Encoding(format!(
                "field element {trimmed} exceeds the field modulus"
            )));
        }
        Ok(Self(Fr::from_be_bytes_mod_order(&value.to_bytes_be())))
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
