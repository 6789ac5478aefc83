//! The transaction lifecycle state machine.
//!
//! ```text
//! Building -> Unsigned -> Authorized -> Submitted -> Included | Rejected | TimedOut
//! ```
//!
//! Each state is its own type and every transition consumes the previous
//! one, so a transaction cannot be re-authorized or re-sent. Building
//! captures preconditions from the [`AccountStateCache`] at call time; the
//! proofs attached during authorization are generated against that same
//! snapshot, so staleness surfaces as a `PreconditionFailure` or a ledger
//! rejection rather than being silently absorbed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::account::AccountRecord;
use crate::backend::VerificationKey;
use crate::cache::AccountStateCache;
use crate::contract::ContractInstance;
use crate::crypto::{Keypair, PublicKey};
use crate::error::{NetworkError, Result, ZkappError};
use crate::field::FieldElement;
use crate::ledger::{InclusionStatus, TransactionHandle};
use crate::network::Network;
use crate::prover::Prover;
use crate::transaction::{
    AccountUpdate, Authorization, AuthorizationKind, FeePayer, MethodWitness, Mutation,
    Transaction, UpdateKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Building,
    Unsigned,
    Authorized,
    Submitted,
    Included,
    Rejected,
    TimedOut,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Included | Self::Rejected | Self::TimedOut)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Building => "building",
            Self::Unsigned => "unsigned",
            Self::Authorized => "authorized",
            Self::Submitted => "submitted",
            Self::Included => "included",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Records account updates in order. Handed to the build callback of
/// [`Network::transaction`].
pub struct TransactionBuilder {
    cache: Arc<AccountStateCache>,
    fee_payer: FeePayer,
    account_creation_fee: u64,
    updates: Vec<AccountUpdate>,
    /// State as it will be after the updates recorded so far.
    staged: HashMap<PublicKey, Vec<FieldElement>>,
}

impl TransactionBuilder {
    /// Start building; the fee payer nonce is read from the cache now.
    pub(crate) fn begin(
        cache: Arc<AccountStateCache>,
        fee_payer: PublicKey,
        fee: u64,
        account_creation_fee: u64,
    ) -> Result<Self> {
        let payer = cache.get(&fee_payer)?;
        tracing::debug!(fee_payer = %fee_payer, nonce = payer.nonce, "building transaction");
        Ok(Self {
            cache,
            fee_payer: FeePayer {
                public_key: fee_payer,
                fee,
                nonce: payer.nonce,
                authorization: Authorization::None,
            },
            account_creation_fee,
            updates: Vec::new(),
            staged: HashMap::new(),
        })
    }

    pub fn fee_payer(&self) -> &PublicKey {
        &self.fee_payer.public_key
    }

    pub fn nonce(&self) -> u64 {
        self.fee_payer.nonce
    }

    /// Pay the creation fee for one new account from the fee payer.
    pub fn fund_new_account(&mut self) -> Result<()> {
        let fee = i64::try_from(self.account_creation_fee).map_err(|_| ZkappError::InvalidCall {
            method: "fund_new_account".into(),
            reason: format!(
                "account creation fee {} does not fit a balance change",
                self.account_creation_fee
            ),
        })?;
        self.updates.push(AccountUpdate {
            target: self.fee_payer.public_key,
            kind: UpdateKind::Fund,
            balance_change: -fee,
            preconditions: Vec::new(),
            mutations: Vec::new(),
            verification_key: None,
            authorization: Authorization::None,
            witness: None,
        });
        Ok(())
    }

    /// Deploy `instance` with its verification key and full initial state.
    pub fn deploy(
        &mut self,
        instance: &ContractInstance,
        verification_key: &VerificationKey,
        initial_state: &[FieldElement],
    ) -> Result<()> {
        let definition = &instance.definition;
        if verification_key.fingerprint != definition.fingerprint()? {
            return Err(ZkappError::Compilation(format!(
                "verification key {} was not compiled from contract '{}'",
                verification_key.fingerprint,
                definition.name()
            )));
        }
        if initial_state.len() != definition.slot_count() {
            return Err(ZkappError::InvalidCall {
                method: "deploy".into(),
                reason: format!(
                    "initial state has {} value(s), contract declares {} slot(s)",
                    initial_state.len(),
                    definition.slot_count()
                ),
            });
        }
        self.updates.push(AccountUpdate {
            target: instance.address,
            kind: UpdateKind::Deploy {
                slot_count: definition.slot_count(),
            },
            balance_change: 0,
            preconditions: Vec::new(),
            mutations: initial_state
                .iter()
                .enumerate()
                .map(|(slot, value)| Mutation { slot, value: *value })
                .collect(),
            verification_key: Some(verification_key.clone()),
            authorization: Authorization::None,
            witness: None,
        });
        self.staged.insert(instance.address, initial_state.to_vec());
        Ok(())
    }

    /// Record a call of `method`, capturing preconditions from the state seen now.
    ///
    /// Assertions that do not hold against the snapshot are not an error here:
    /// they fail when the proof is generated.
    pub fn call(
        &mut self,
        instance: &ContractInstance,
        method: &str,
        args: &[FieldElement],
    ) -> Result<()> {
        let definition = &instance.definition;
        let declared = definition.method(method).ok_or_else(|| ZkappError::InvalidCall {
            method: method.to_string(),
            reason: format!("contract '{}' declares no such method", definition.name()),
        })?;
        let snapshot = match self.staged.get(&instance.address) {
            Some(state) => state.clone(),
            None => self.cache.get(&instance.address)?.state,
        };

        let evaluation = declared.circuit.evaluate(args, &snapshot)?;
        if !evaluation.is_satisfied() {
            tracing::debug!(
                method,
                violations = ?evaluation.violations,
                "call recorded against a snapshot that violates its assertions"
            );
        }
        tracing::debug!(
            method,
            target = %instance.address,
            preconditions = evaluation.preconditions.len(),
            mutations = evaluation.mutations.len(),
            "recorded call"
        );

        let mut next = snapshot.clone();
        for mutation in &evaluation.mutations {
            if let Some(slot) = next.get_mut(mutation.slot) {
                *slot = mutation.value;
            }
        }
        self.staged.insert(instance.address, next);

        self.updates.push(AccountUpdate {
            target: instance.address,
            kind: UpdateKind::Call {
                method: method.to_string(),
            },
            balance_change: 0,
            preconditions: evaluation.preconditions,
            mutations: evaluation.mutations,
            verification_key: None,
            authorization: Authorization::None,
            witness: Some(MethodWitness {
                contract: Arc::clone(definition),
                args: args.to_vec(),
                snapshot,
            }),
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> UnsignedTransaction {
        UnsignedTransaction {
            transaction: Transaction {
                fee_payer: self.fee_payer,
                account_updates: self.updates,
            },
        }
    }
}

/// A built transaction awaiting signatures and proofs.
#[derive(Debug)]
pub struct UnsignedTransaction {
    transaction: Transaction,
}

impl UnsignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Attach a signature or proof to every update and sign for the fee payer.
    ///
    /// `signers` must hold the fee payer key and the key of every
    /// signature-authorized update target.
    pub async fn authorize(
        self,
        signers: &[&Keypair],
        prover: &Prover,
    ) -> Result<AuthorizedTransaction> {
        let mut transaction = self.transaction;
        let commitment = transaction.commitment()?;
        let signer_for = |public_key: &PublicKey| {
            signers
                .iter()
                .find(|keypair| keypair.public_key() == *public_key)
        };

        for (index, update) in transaction.account_updates.iter_mut().enumerate() {
            update.authorization = match update.required_authorization() {
                AuthorizationKind::Signature => {
                    let signer = signer_for(&update.target).ok_or_else(|| ZkappError::Signature {
                        update: Some(index),
                        reason: format!("no signing key for {}", update.target),
                    })?;
                    Authorization::Signature(signer.sign(&commitment))
                }
                AuthorizationKind::Proof => {
                    let witness = update.witness.as_ref().ok_or_else(|| {
                        ZkappError::ProofGeneration(format!(
                            "account update #{index} carries no witness"
                        ))
                    })?;
                    let keys = prover.compile(&witness.contract).await?;
                    let snapshot = witness.snapshot.clone();
                    let proof = prover
                        .prove(&keys.proving_key, update, &snapshot)
                        .await
                        .map_err(|err| err.at_update(index))?;
                    Authorization::Proof(proof)
                }
            };
        }

        let fee_payer = transaction.fee_payer.public_key;
        let signer = signer_for(&fee_payer).ok_or_else(|| ZkappError::Signature {
            update: None,
            reason: format!("no signing key for fee payer {fee_payer}"),
        })?;
        transaction.fee_payer.authorization = Authorization::Signature(signer.sign(&commitment));
        tracing::debug!(
            commitment = %hex::encode(commitment),
            updates = transaction.account_updates.len(),
            "authorized transaction"
        );
        Ok(AuthorizedTransaction { transaction })
    }
}

/// A fully signed and proved transaction, ready to submit.
#[derive(Debug)]
pub struct AuthorizedTransaction {
    transaction: Transaction,
}

impl AuthorizedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Hand the transaction to the ledger.
    ///
    /// Fails with `StaleNonce` when the fee payer nonce observed at build time
    /// no longer matches the ledger.
    pub async fn send(self, network: &Network) -> Result<PendingTransaction> {
        let fee_payer = self.transaction.fee_payer.public_key;
        let nonce = self.transaction.fee_payer.nonce;
        let handle = network.ledger().send_transaction(&self.transaction).await?;
        tracing::info!(%handle, %fee_payer, nonce, "submitted transaction");
        Ok(PendingTransaction {
            handle,
            fee_payer,
            nonce,
            network: network.clone(),
        })
    }
}

/// A submitted transaction. The caller keeps only the handle.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    handle: TransactionHandle,
    fee_payer: PublicKey,
    nonce: u64,
    network: Network,
}

impl PendingTransaction {
    pub fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn fee_payer(&self) -> &PublicKey {
        &self.fee_payer
    }

    /// Poll until the ledger reports a final status or `timeout` elapses.
    ///
    /// On inclusion the reported account records replace their cache entries.
    /// Transient transport failures are retried until the timeout.
    pub async fn wait(&self, timeout: Duration) -> Result<TransactionOutcome> {
        match tokio::time::timeout(timeout, self.poll()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(handle = %self.handle, ?timeout, "inclusion wait timed out");
                Ok(TransactionOutcome::TimedOut {
                    handle: self.handle.clone(),
                })
            }
        }
    }

    async fn poll(&self) -> Result<TransactionOutcome> {
        let interval = self.network.config().poll_interval();
        loop {
            match self.network.ledger().query_inclusion(&self.handle).await {
                Ok(InclusionStatus::Pending) => {
                    tracing::debug!(handle = %self.handle, "transaction pending");
                }
                Ok(InclusionStatus::Included { accounts }) => {
                    self.network.cache().store_fetched(accounts.clone());
                    tracing::info!(handle = %self.handle, accounts = accounts.len(), "transaction included");
                    return Ok(TransactionOutcome::Included {
                        handle: self.handle.clone(),
                        accounts,
                    });
                }
                Ok(InclusionStatus::Rejected { reason }) => {
                    tracing::warn!(handle = %self.handle, %reason, "transaction rejected");
                    return Ok(TransactionOutcome::Rejected {
                        handle: self.handle.clone(),
                        reason,
                    });
                }
                Err(ZkappError::Network(
                    err @ (NetworkError::Timeout | NetworkError::Transport(_)),
                )) => {
                    tracing::warn!(handle = %self.handle, error = %err, "inclusion poll failed, retrying");
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Terminal state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Included {
        handle: TransactionHandle,
        accounts: Vec<AccountRecord>,
    },
    Rejected {
        handle: TransactionHandle,
        reason: String,
    },
    /// Not a rejection: the transaction may still land.
    TimedOut { handle: TransactionHandle },
}

impl TransactionOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            Self::Included { .. } => TransactionStatus::Included,
            Self::Rejected { .. } => TransactionStatus::Rejected,
            Self::TimedOut { .. } => TransactionStatus::TimedOut,
        }
    }

    pub fn handle(&self) -> &TransactionHandle {
        match self {
            Self::Included { handle, .. }
            | Self::Rejected { handle, .. }
            | Self::TimedOut { handle } => handle,
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, Self::Included { .. })
    }

    /// Included account records, or the failure as an error.
    pub fn into_included(self) -> Result<Vec<AccountRecord>> {
        match self {
            Self::Included { accounts, .. } => Ok(accounts),
            Self::Rejected { reason, .. } => Err(ZkappError::Rejected(reason)),
            Self::TimedOut { .. } => Err(NetworkError::Timeout.into()),
        }
    }
}
