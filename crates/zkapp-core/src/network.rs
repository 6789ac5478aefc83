//! The explicit network context threaded through every lifecycle call.

use std::fmt;
use std::sync::Arc;

use crate::account::AccountRecord;
use crate::cache::AccountStateCache;
use crate::config::NetworkConfig;
use crate::contract::ContractInstance;
use crate::crypto::{Keypair, PublicKey};
use crate::error::{NetworkError, Result, ZkappError};
use crate::field::FieldElement;
use crate::ledger::{HttpLedgerClient, LedgerClient};
use crate::lifecycle::{TransactionBuilder, TransactionOutcome, UnsignedTransaction};
use crate::prover::Prover;

/// A ledger client, the account cache it feeds and the client settings.
///
/// Cloning is cheap and clones share the same cache.
#[derive(Clone)]
pub struct Network {
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<AccountStateCache>,
    config: NetworkConfig,
}

impl Network {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: NetworkConfig) -> Self {
        Self {
            ledger,
            cache: Arc::new(AccountStateCache::new()),
            config,
        }
    }

    /// Connect to the JSON-RPC ledger at `config.endpoint`.
    pub fn connect(config: NetworkConfig) -> Result<Self> {
        if config.is_local() {
            return Err(NetworkError::Transport(
                "endpoint 'local' has no remote ledger; pass a LocalLedger to Network::new".into(),
            )
            .into());
        }
        let client = HttpLedgerClient::from_endpoint(&config.endpoint, config.request_timeout())?;
        tracing::debug!(endpoint = %client.endpoint(), "connected to ledger");
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    pub fn cache(&self) -> &AccountStateCache {
        &self.cache
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Fetch `public_key` from the ledger into the cache.
    pub async fn fetch_account(&self, public_key: &PublicKey) -> Result<AccountRecord> {
        self.cache.refresh(self.ledger.as_ref(), public_key).await
    }

    /// Run `build` as the Building phase of a new transaction.
    ///
    /// The fee payer must already be cached; its nonce is taken from there.
    pub fn transaction<F>(&self, fee_payer: PublicKey, fee: u64, build: F) -> Result<UnsignedTransaction>
    where
        F: FnOnce(&mut TransactionBuilder) -> Result<()>,
    {
        let mut builder = TransactionBuilder::begin(
            Arc::clone(&self.cache),
            fee_payer,
            fee,
            self.config.account_creation_fee,
        )?;
        build(&mut builder)?;
        Ok(builder.finish())
    }

    /// Refresh, build, authorize, send and wait, retrying on retryable errors.
    ///
    /// Every attempt refreshes the fee payer and the accounts in `refresh`
    /// before a fresh Building phase. Accounts in `refresh` that do not exist
    /// yet are skipped. `Rejected` and `TimedOut` outcomes are returned as-is.
    ///
    /// A send that fails in transit may still have been applied. If the fee
    /// payer nonce has moved past it by the next attempt, `execute` stops with
    /// `Indeterminate` instead of building the transaction again.
    pub async fn execute<F>(
        &self,
        fee_payer: &Keypair,
        signers: &[&Keypair],
        prover: &Prover,
        refresh: &[PublicKey],
        build: F,
    ) -> Result<TransactionOutcome>
    where
        F: Fn(&mut TransactionBuilder) -> Result<()>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut all_signers: Vec<&Keypair> = Vec::with_capacity(signers.len() + 1);
        all_signers.push(fee_payer);
        all_signers.extend_from_slice(signers);

        // nonce of a submission whose fate is unknown
        let mut in_doubt = None;
        let mut attempt = 1;
        loop {
            match self
                .attempt(
                    fee_payer.public_key(),
                    &all_signers,
                    prover,
                    refresh,
                    &build,
                    &mut in_doubt,
                )
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, max_attempts, error = %err, "retrying transaction against refreshed state");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt<F>(
        &self,
        fee_payer: PublicKey,
        signers: &[&Keypair],
        prover: &Prover,
        refresh: &[PublicKey],
        build: &F,
        in_doubt: &mut Option<u64>,
    ) -> Result<TransactionOutcome>
    where
        F: Fn(&mut TransactionBuilder) -> Result<()>,
    {
        let payer = self.fetch_account(&fee_payer).await?;
        if let Some(nonce) = *in_doubt {
            if payer.nonce > nonce {
                tracing::warn!(%fee_payer, nonce, ledger_nonce = payer.nonce, "earlier submission may have landed");
                return Err(ZkappError::Indeterminate { fee_payer, nonce });
            }
        }
        for public_key in refresh {
            match self.fetch_account(public_key).await {
                Ok(_) => {}
                Err(ZkappError::Network(NetworkError::NotFound(_))) => {
                    tracing::debug!(account = %public_key, "account not on ledger yet");
                }
                Err(err) => return Err(err),
            }
        }
        let fee = self.config.fee;
        let unsigned = self.transaction(fee_payer, fee, |tx| build(tx))?;
        let nonce = unsigned.transaction().fee_payer.nonce;
        let authorized = unsigned.authorize(signers, prover).await?;
        let pending = match authorized.send(self).await {
            Ok(pending) => pending,
            Err(err @ ZkappError::Network(NetworkError::Timeout | NetworkError::Transport(_))) => {
                *in_doubt = Some(nonce);
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        pending.wait(self.config.inclusion_timeout()).await
    }

    /// Refresh `instance` and check each named slot against its expected value.
    pub async fn expect_state(
        &self,
        instance: &ContractInstance,
        expected: &[(&str, FieldElement)],
    ) -> Result<AccountRecord> {
        let record = self.fetch_account(&instance.address).await?;
        for (slot, value) in expected {
            let index = instance.definition.slot_index(slot).ok_or_else(|| {
                ZkappError::InvalidCall {
                    method: "expect_state".into(),
                    reason: format!(
                        "contract '{}' declares no slot '{slot}'",
                        instance.definition.name()
                    ),
                }
            })?;
            let observed = record.slot(index).unwrap_or_default();
            if observed != *value {
                return Err(ZkappError::Verification {
                    account: instance.address,
                    slot: slot.to_string(),
                    expected: *value,
                    observed,
                });
            }
        }
        Ok(record)
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("endpoint", &self.config.endpoint)
            .field("cached_accounts", &self.cache.len())
            .finish_non_exhaustive()
    }
}
