//! Core library for zkapp clients.
//!
//! Declares contracts as explicit registration tables ([`contract`]), compiles
//! them through a pluggable [`backend::ProvingBackend`] ([`prover`]) and drives
//! transactions through the lifecycle in [`lifecycle`]:
//! build against a cached snapshot, authorize with signatures and proofs,
//! submit, wait for inclusion and verify the resulting state.
//!
//! The [`network::Network`] value bundles a [`ledger::LedgerClient`] with the
//! [`cache::AccountStateCache`] it feeds; there is no global active network.
//! Proving systems live in their own crates:
//! - [`zkapp_transcript`](https://docs.rs/zkapp-transcript): development transcript prover

pub mod account;
pub mod backend;
pub mod cache;
pub mod config;
pub mod contract;
pub mod crypto;
mod encoding;
pub mod error;
pub mod field;
pub mod key_cache;
pub mod ledger;
pub mod lifecycle;
pub mod network;
pub mod prover;
pub mod sample;
#[cfg(test)]
mod testing;
pub mod transaction;

pub use account::AccountRecord;
pub use cache::AccountStateCache;
pub use config::NetworkConfig;
pub use contract::{ContractDefinition, ContractInstance, MethodDecl, ParamType};
pub use crypto::{Keypair, PublicKey};
pub use error::{NetworkError, Result, ZkappError};
pub use field::FieldElement;
pub use lifecycle::{TransactionOutcome, TransactionStatus};
pub use network::Network;
pub use prover::Prover;
