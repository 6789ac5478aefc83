//! An in-process ledger for tests and local runs.
//!
//! Transactions are checked and applied at submission: the fee payer nonce
//! and signature first, then every account update in order against a
//! scratch copy of the accounts. A transaction whose updates fail still
//! pays its fee and consumes its nonce, and is reported as rejected.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::account::AccountRecord;
use crate::backend::ProvingBackend;
use crate::crypto::PublicKey;
use crate::error::{NetworkError, Result, ZkappError};
use crate::field::FieldElement;
use crate::transaction::{AccountUpdate, Authorization, AuthorizationKind, Transaction, UpdateKind};

use super::{InclusionStatus, LedgerClient, TransactionHandle};

/// Fee charged for creating a new account, matching `NetworkConfig`'s default.
pub const DEFAULT_ACCOUNT_CREATION_FEE: u64 = 1_000_000_000;

#[derive(Debug)]
struct Submission {
    status: InclusionStatus,
    /// Polls left that report `Pending` before `status` is revealed.
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<PublicKey, AccountRecord>,
    submissions: HashMap<TransactionHandle, Submission>,
}

pub struct LocalLedger {
    verifier: Option<Arc<dyn ProvingBackend>>,
    inclusion_delay: u32,
    account_creation_fee: u64,
    state: Mutex<LedgerState>,
}

impl LocalLedger {
    /// A ledger that checks proofs with `verifier`.
    pub fn new(verifier: Arc<dyn ProvingBackend>) -> Self {
        Self {
            verifier: Some(verifier),
            ..Self::without_proofs()
        }
    }

    /// A ledger that rejects every proof-authorized update.
    pub fn without_proofs() -> Self {
        Self {
            verifier: None,
            inclusion_delay: 0,
            account_creation_fee: DEFAULT_ACCOUNT_CREATION_FEE,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Report each submission as pending for `polls` queries before revealing it.
    pub fn with_inclusion_delay(mut self, polls: u32) -> Self {
        self.inclusion_delay = polls;
        self
    }

    pub fn with_account_creation_fee(mut self, fee: u64) -> Self {
        self.account_creation_fee = fee;
        self
    }

    /// Insert or overwrite an account directly.
    pub fn add_account(&self, record: AccountRecord) {
        self.state.lock().accounts.insert(record.public_key, record);
    }

    pub fn account(&self, public_key: &PublicKey) -> Option<AccountRecord> {
        self.state.lock().accounts.get(public_key).cloned()
    }

    fn apply(
        &self,
        accounts: &mut HashMap<PublicKey, AccountRecord>,
        transaction: &Transaction,
        commitment: &[u8; 32],
    ) -> std::result::Result<Vec<PublicKey>, String> {
        let mut touched = vec![transaction.fee_payer.public_key];
        let mut creation_credits = 0usize;

        for (index, update) in transaction.account_updates.iter().enumerate() {
            let fail = |reason: String| format!("account update #{index}: {reason}");

            match &update.kind {
                UpdateKind::Fund => {
                    let fee = i64::try_from(self.account_creation_fee).map_err(|_| {
                        fail(format!(
                            "account creation fee {} is out of range",
                            self.account_creation_fee
                        ))
                    })?;
                    if update.balance_change != -fee {
                        return Err(fail(format!(
                            "funding must pay the account creation fee of {}",
                            self.account_creation_fee
                        )));
                    }
                    creation_credits += 1;
                }
                UpdateKind::Deploy { .. } if !accounts.contains_key(&update.target) => {
                    if creation_credits == 0 {
                        return Err(fail(format!(
                            "account {} does not exist and no account creation was funded",
                            update.target
                        )));
                    }
                    creation_credits -= 1;
                    accounts.insert(update.target, AccountRecord::new(update.target, 0, 0));
                }
                _ => {}
            }

            let account = accounts
                .get_mut(&update.target)
                .ok_or_else(|| fail(format!("account {} does not exist", update.target)))?;
            self.check_authorization(account, update, commitment)
                .map_err(&fail)?;
            apply_update(account, update).map_err(&fail)?;

            if !touched.contains(&update.target) {
                touched.push(update.target);
            }
        }
        Ok(touched)
    }

    fn check_authorization(
        &self,
        account: &AccountRecord,
        update: &AccountUpdate,
        commitment: &[u8; 32],
    ) -> std::result::Result<(), String> {
        match (update.required_authorization(), &update.authorization) {
            (AuthorizationKind::Signature, Authorization::Signature(signature)) => update
                .target
                .verify(commitment, signature)
                .map_err(|err| err.to_string()),
            (AuthorizationKind::Proof, Authorization::Proof(proof)) => {
                let verification_key = account
                    .verification_key
                    .as_ref()
                    .ok_or_else(|| format!("{} has no verification key", account.public_key))?;
                let verifier = self
                    .verifier
                    .as_ref()
                    .ok_or_else(|| "ledger cannot verify proofs".to_string())?;
                let inputs = update
                    .public_inputs()
                    .ok_or_else(|| "proof on a non-method update".to_string())?;
                if verifier.verify(verification_key, &inputs, proof) {
                    Ok(())
                } else {
                    Err("proof does not verify".into())
                }
            }
            (expected, _) => Err(format!("expected {expected:?} authorization")),
        }
    }
}

fn apply_update(account: &mut AccountRecord, update: &AccountUpdate) -> std::result::Result<(), String> {
    match &update.kind {
        UpdateKind::Deploy { slot_count } => {
            let verification_key = update
                .verification_key
                .clone()
                .ok_or_else(|| "deploy carries no verification key".to_string())?;
            if account.is_zkapp() && account.state.len() != *slot_count {
                return Err(format!(
                    "deployed contract has {} slot(s), redeploy declares {slot_count}",
                    account.state.len()
                ));
            }
            account.verification_key = Some(verification_key);
            account.state = vec![FieldElement::zero(); *slot_count];
        }
        UpdateKind::Call { method } if !account.is_zkapp() => {
            return Err(format!("cannot call '{method}' on a non-contract account"));
        }
        _ => {}
    }

    if let Some(unmet) = update
        .preconditions
        .iter()
        .find(|precondition| !precondition.holds(&account.state))
    {
        return Err(format!("precondition {} does not hold", unmet.describe(&[])));
    }
    for mutation in &update.mutations {
        let slot = account
            .state
            .get_mut(mutation.slot)
            .ok_or_else(|| format!("slot {} is out of range", mutation.slot))?;
        *slot = mutation.value;
    }

    let balance = if update.balance_change >= 0 {
        account.balance.checked_add(update.balance_change as u64)
    } else {
        account.balance.checked_sub(update.balance_change.unsigned_abs())
    };
    account.balance = balance.ok_or_else(|| {
        format!(
            "balance {} cannot absorb change {}",
            account.balance, update.balance_change
        )
    })?;
    Ok(())
}

#[async_trait]
impl LedgerClient for LocalLedger {
    async fn get_account(&self, public_key: &PublicKey) -> Result<AccountRecord> {
        self.account(public_key)
            .ok_or_else(|| NetworkError::NotFound(*public_key).into())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<TransactionHandle> {
        let commitment = transaction.commitment()?;
        let handle = TransactionHandle(hex::encode(commitment));
        let fee_payer = &transaction.fee_payer;

        let mut state = self.state.lock();
        let payer = state
            .accounts
            .get(&fee_payer.public_key)
            .ok_or_else(|| {
                ZkappError::Rejected(format!("fee payer {} does not exist", fee_payer.public_key))
            })?;
        if payer.nonce != fee_payer.nonce {
            return Err(ZkappError::StaleNonce {
                fee_payer: fee_payer.public_key,
                used: fee_payer.nonce,
                expected: payer.nonce,
            });
        }
        match &fee_payer.authorization {
            Authorization::Signature(signature) => fee_payer
                .public_key
                .verify(&commitment, signature)
                .map_err(|err| ZkappError::Rejected(format!("fee payer: {err}")))?,
            _ => return Err(ZkappError::Rejected("fee payer signature missing".into())),
        }
        if payer.balance < fee_payer.fee {
            return Err(ZkappError::Rejected(format!(
                "fee payer balance {} does not cover fee {}",
                payer.balance, fee_payer.fee
            )));
        }

        if let Some(payer) = state.accounts.get_mut(&fee_payer.public_key) {
            payer.balance -= fee_payer.fee;
            payer.nonce += 1;
        }

        let mut scratch = state.accounts.clone();
        let status = match self.apply(&mut scratch, transaction, &commitment) {
            Ok(touched) => {
                let accounts: Vec<AccountRecord> = touched
                    .iter()
                    .filter_map(|key| scratch.remove(key))
                    .collect();
                for record in &accounts {
                    state.accounts.insert(record.public_key, record.clone());
                }
                tracing::info!(
                    %handle,
                    fee_payer = %fee_payer.public_key,
                    nonce = fee_payer.nonce,
                    updates = transaction.account_updates.len(),
                    "applied transaction"
                );
                InclusionStatus::Included { accounts }
            }
            Err(reason) => {
                tracing::warn!(%handle, %reason, "transaction failed to apply");
                InclusionStatus::Rejected { reason }
            }
        };
        state.submissions.insert(
            handle.clone(),
            Submission {
                status,
                polls_remaining: self.inclusion_delay,
            },
        );
        Ok(handle)
    }

    async fn query_inclusion(&self, handle: &TransactionHandle) -> Result<InclusionStatus> {
        let mut state = self.state.lock();
        let submission = state
            .submissions
            .get_mut(handle)
            .ok_or_else(|| ZkappError::Rejected(format!("unknown transaction {handle}")))?;
        if submission.polls_remaining > 0 {
            submission.polls_remaining -= 1;
            return Ok(InclusionStatus::Pending);
        }
        Ok(submission.status.clone())
    }
}

impl std::fmt::Debug for LocalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLedger")
            .field("verifier", &self.verifier.as_ref().map(|v| v.name()))
            .field("inclusion_delay", &self.inclusion_delay)
            .field("account_creation_fee", &self.account_creation_fee)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fingerprint, VerificationKey};
    use crate::crypto::Keypair;
    use crate::testing::DigestBackend;
    use crate::transaction::{FeePayer, Mutation, Precondition};

    const FEE: u64 = 10;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    fn funded(ledger: &LocalLedger, balance: u64) -> Keypair {
        let keypair = Keypair::generate();
        ledger.add_account(AccountRecord::new(keypair.public_key(), balance, 0));
        keypair
    }

    fn unsigned(payer: &Keypair, nonce: u64, updates: Vec<AccountUpdate>) -> Transaction {
        Transaction {
            fee_payer: FeePayer {
                public_key: payer.public_key(),
                fee: FEE,
                nonce,
                authorization: Authorization::None,
            },
            account_updates: updates,
        }
    }

    /// Sign the fee payer and every signature-authorized update.
    fn sign(mut tx: Transaction, payer: &Keypair, signers: &[&Keypair]) -> Transaction {
        let commitment = tx.commitment().unwrap();
        tx.fee_payer.authorization = Authorization::Signature(payer.sign(&commitment));
        for update in &mut tx.account_updates {
            if let Some(signer) = signers.iter().find(|k| k.public_key() == update.target) {
                update.authorization = Authorization::Signature(signer.sign(&commitment));
            }
        }
        tx
    }

    fn update(target: PublicKey, kind: UpdateKind, balance_change: i64) -> AccountUpdate {
        AccountUpdate {
            target,
            kind,
            balance_change,
            preconditions: vec![],
            mutations: vec![],
            verification_key: None,
            authorization: Authorization::None,
            witness: None,
        }
    }

    fn deploy_updates(payer: &Keypair, zkapp: &Keypair, fee: u64) -> Vec<AccountUpdate> {
        let mut deploy = update(zkapp.public_key(), UpdateKind::Deploy { slot_count: 1 }, 0);
        deploy.verification_key = Some(VerificationKey {
            fingerprint: Fingerprint([5u8; 32]),
            data: vec![],
        });
        deploy.mutations = vec![Mutation { slot: 0, value: fe(1) }];
        vec![update(payer.public_key(), UpdateKind::Fund, -(fee as i64)), deploy]
    }

    #[tokio::test]
    async fn test_deploy_creates_account_and_charges_fees() {
        let ledger = LocalLedger::without_proofs().with_account_creation_fee(100);
        let payer = funded(&ledger, 1_000);
        let zkapp = Keypair::generate();

        let tx = sign(unsigned(&payer, 0, deploy_updates(&payer, &zkapp, 100)), &payer, &[&payer, &zkapp]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Included { accounts } => assert_eq!(accounts.len(), 2),
            other => panic!("unexpected status {other:?}"),
        }

        let deployed = ledger.account(&zkapp.public_key()).unwrap();
        assert_eq!(deployed.state, vec![fe(1)]);
        assert!(deployed.is_zkapp());
        let payer_after = ledger.account(&payer.public_key()).unwrap();
        assert_eq!(payer_after.balance, 1_000 - FEE - 100);
        assert_eq!(payer_after.nonce, 1);
    }

    #[tokio::test]
    async fn test_stale_nonce_rejected_at_submission() {
        let ledger = LocalLedger::without_proofs();
        let payer = funded(&ledger, 1_000);
        let tx = sign(unsigned(&payer, 4, vec![]), &payer, &[]);
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(
            err,
            ZkappError::StaleNonce {
                used: 4,
                expected: 0,
                ..
            }
        ));
        assert_eq!(ledger.account(&payer.public_key()).unwrap().nonce, 0);
    }

    #[tokio::test]
    async fn test_missing_fee_payer_signature_rejected() {
        let ledger = LocalLedger::without_proofs();
        let payer = funded(&ledger, 1_000);
        let err = ledger
            .send_transaction(&unsigned(&payer, 0, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ZkappError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_failed_update_consumes_fee_and_nonce() {
        let ledger = LocalLedger::without_proofs();
        let payer = funded(&ledger, 1_000);
        let zkapp = Keypair::generate();
        // deploy without funding the new account
        let updates = deploy_updates(&payer, &zkapp, 0).split_off(1);
        let tx = sign(unsigned(&payer, 0, updates), &payer, &[&zkapp]);
        let handle = ledger.send_transaction(&tx).await.unwrap();

        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Rejected { reason } => {
                assert!(reason.contains("no account creation was funded"), "{reason}")
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(ledger.account(&zkapp.public_key()).is_none());
        let payer_after = ledger.account(&payer.public_key()).unwrap();
        assert_eq!(payer_after.nonce, 1);
        assert_eq!(payer_after.balance, 1_000 - FEE);
    }

    #[tokio::test]
    async fn test_precondition_checked_against_current_state() {
        let ledger = LocalLedger::without_proofs();
        let payer = funded(&ledger, 1_000);
        let mut account = AccountRecord::new(payer.public_key(), 1_000, 0);
        account.state = vec![fe(2)];
        ledger.add_account(account);

        let mut guarded = update(payer.public_key(), UpdateKind::Fund, -(DEFAULT_ACCOUNT_CREATION_FEE as i64));
        guarded.preconditions = vec![Precondition::StateEquals { slot: 0, value: fe(3) }];
        let tx = sign(unsigned(&payer, 0, vec![guarded]), &payer, &[&payer]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Rejected { reason } => {
                assert!(reason.contains("account update #0"), "{reason}");
                assert!(reason.contains("slot0 == 3"), "{reason}");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_proof_update_rejected_without_verifier() {
        let ledger = LocalLedger::without_proofs();
        let payer = funded(&ledger, 1_000);
        let mut account = AccountRecord::new(Keypair::generate().public_key(), 0, 0);
        account.state = vec![fe(1)];
        account.verification_key = Some(VerificationKey {
            fingerprint: Fingerprint([1u8; 32]),
            data: vec![],
        });
        ledger.add_account(account.clone());

        let mut call = update(
            account.public_key,
            UpdateKind::Call {
                method: "update".into(),
            },
            0,
        );
        call.authorization = Authorization::Proof(vec![0u8; 64]);
        let tx = sign(unsigned(&payer, 0, vec![call]), &payer, &[]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        assert!(matches!(
            ledger.query_inclusion(&handle).await.unwrap(),
            InclusionStatus::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_call_balance_change_is_bound_to_proof() {
        let ledger = LocalLedger::new(DigestBackend::shared());
        let payer = funded(&ledger, 1_000);
        let verification_key = VerificationKey {
            fingerprint: Fingerprint([9u8; 32]),
            data: vec![9u8; 32],
        };
        let mut zkapp = AccountRecord::new(Keypair::generate().public_key(), 0, 0);
        zkapp.state = vec![fe(3)];
        zkapp.verification_key = Some(verification_key.clone());
        ledger.add_account(zkapp.clone());

        // proved with no balance change, submitted with `balance_change`
        let call = |balance_change: i64| {
            let mut call = update(
                zkapp.public_key,
                UpdateKind::Call {
                    method: "set_to".into(),
                },
                0,
            );
            call.preconditions = vec![Precondition::StateEquals { slot: 0, value: fe(3) }];
            call.mutations = vec![Mutation { slot: 0, value: fe(4) }];
            let proof = DigestBackend::tag(&verification_key.data, &call.public_inputs().unwrap());
            call.balance_change = balance_change;
            call.authorization = Authorization::Proof(proof);
            call
        };

        let tx = sign(unsigned(&payer, 0, vec![call(5_000_000)]), &payer, &[]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Rejected { reason } => {
                assert!(reason.contains("proof does not verify"), "{reason}")
            }
            other => panic!("unexpected status {other:?}"),
        }
        let after = ledger.account(&zkapp.public_key).unwrap();
        assert_eq!(after.balance, 0);
        assert_eq!(after.state, vec![fe(3)]);

        let tx = sign(unsigned(&payer, 1, vec![call(0)]), &payer, &[]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        assert!(matches!(
            ledger.query_inclusion(&handle).await.unwrap(),
            InclusionStatus::Included { .. }
        ));
        assert_eq!(ledger.account(&zkapp.public_key).unwrap().state, vec![fe(4)]);
    }

    #[tokio::test]
    async fn test_redeploy_keeps_state_length() {
        let ledger = LocalLedger::without_proofs().with_account_creation_fee(100);
        let payer = funded(&ledger, 1_000);
        let zkapp = Keypair::generate();
        let tx = sign(unsigned(&payer, 0, deploy_updates(&payer, &zkapp, 100)), &payer, &[&payer, &zkapp]);
        ledger.send_transaction(&tx).await.unwrap();

        let redeploy = |slot_count: usize| {
            let mut deploy = update(zkapp.public_key(), UpdateKind::Deploy { slot_count }, 0);
            deploy.verification_key = Some(VerificationKey {
                fingerprint: Fingerprint([6u8; 32]),
                data: vec![],
            });
            deploy.mutations = vec![Mutation { slot: 0, value: fe(7) }];
            deploy
        };

        let tx = sign(unsigned(&payer, 1, vec![redeploy(3)]), &payer, &[&zkapp]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Rejected { reason } => {
                assert!(reason.contains("redeploy declares 3"), "{reason}")
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(ledger.account(&zkapp.public_key()).unwrap().state, vec![fe(1)]);

        let tx = sign(unsigned(&payer, 2, vec![redeploy(1)]), &payer, &[&zkapp]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        assert!(matches!(
            ledger.query_inclusion(&handle).await.unwrap(),
            InclusionStatus::Included { .. }
        ));
        let redeployed = ledger.account(&zkapp.public_key()).unwrap();
        assert_eq!(redeployed.state, vec![fe(7)]);
        assert_eq!(redeployed.verification_key.unwrap().fingerprint, Fingerprint([6u8; 32]));
    }

    #[tokio::test]
    async fn test_fund_rejects_creation_fee_out_of_range() {
        let ledger = LocalLedger::without_proofs().with_account_creation_fee(1 << 63);
        let payer = funded(&ledger, 1_000);
        let fund = update(payer.public_key(), UpdateKind::Fund, i64::MIN);
        let tx = sign(unsigned(&payer, 0, vec![fund]), &payer, &[&payer]);
        let handle = ledger.send_transaction(&tx).await.unwrap();
        match ledger.query_inclusion(&handle).await.unwrap() {
            InclusionStatus::Rejected { reason } => assert!(reason.contains("out of range"), "{reason}"),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(ledger.account(&payer.public_key()).unwrap().balance, 1_000 - FEE);
    }

    #[tokio::test]
    async fn test_inclusion_delay_reports_pending() {
        let ledger = LocalLedger::without_proofs().with_inclusion_delay(2);
        let payer = funded(&ledger, 1_000);
        let handle = ledger
            .send_transaction(&sign(unsigned(&payer, 0, vec![]), &payer, &[]))
            .await
            .unwrap();
        assert_eq!(ledger.query_inclusion(&handle).await.unwrap(), InclusionStatus::Pending);
        assert_eq!(ledger.query_inclusion(&handle).await.unwrap(), InclusionStatus::Pending);
        assert!(matches!(
            ledger.query_inclusion(&handle).await.unwrap(),
            InclusionStatus::Included { .. }
        ));
    }

    #[tokio::test]
    async fn test_get_account_not_found() {
        let ledger = LocalLedger::without_proofs();
        let pk = Keypair::generate().public_key();
        let err = ledger.get_account(&pk).await.unwrap_err();
        assert!(matches!(err, ZkappError::Network(NetworkError::NotFound(_))));
    }
}
