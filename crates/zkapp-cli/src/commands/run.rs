use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use zkapp_core::ledger::LocalLedger;
use zkapp_core::{
    sample, AccountRecord, ContractInstance, FieldElement, Keypair, Network, NetworkConfig,
    NetworkError, TransactionOutcome, ZkappError,
};
use crate::output;

/// Balance given to the generated fee payer on the local ledger.
const LOCAL_FEE_PAYER_BALANCE: u64 = 1_000_000_000_000;

/// Deploy `SimpleZkapp`, call `update(y)` and check `x == x_before + y`.
pub async fn run(
    config: NetworkConfig,
    fee_payer_key: Option<&str>,
    zkapp_key: Option<&str>,
    y: u64,
    key_dir: &Path,
) -> Result<()> {
    output::print_header("zkapp run");
    output::print_key_value("Endpoint", &config.endpoint);

    let zkapp_key = match zkapp_key {
        Some(secret) => Keypair::from_secret_hex(secret).context("invalid --zkapp-key")?,
        None => Keypair::generate(),
    };
    let fee_payer = match fee_payer_key {
        Some(secret) => Keypair::from_secret_hex(secret).context("invalid --fee-payer-key")?,
        None if config.is_local() => Keypair::generate(),
        None => anyhow::bail!("--fee-payer-key is required for a remote endpoint"),
    };

    output::print_step(1, 4, "Compiling SimpleZkapp...");
    let prover = super::prover(key_dir);
    let zkapp = ContractInstance::new(zkapp_key.public_key(), Arc::new(sample::simple_zkapp()?));
    let pb = output::spinner("Compiling");
    let keys = prover.compile(&zkapp.definition).await?;
    pb.finish_and_clear();
    output::print_key_value("Fingerprint", &keys.verification_key.fingerprint.to_string());

    let network = if config.is_local() {
        let ledger = Arc::new(
            LocalLedger::new(prover.backend())
                .with_account_creation_fee(config.account_creation_fee),
        );
        ledger.add_account(AccountRecord::new(
            fee_payer.public_key(),
            LOCAL_FEE_PAYER_BALANCE,
            0,
        ));
        if fee_payer_key.is_none() {
            output::print_warning("using a generated fee payer funded on the local ledger");
        }
        Network::new(ledger, config)
    } else {
        Network::connect(config)?
    };
    output::print_key_value("Fee payer", &fee_payer.public_key().to_string());
    output::print_key_value("zkapp", &zkapp.address.to_string());

    output::print_step(2, 4, "Deploying...");
    let is_new = match network.fetch_account(&zkapp.address).await {
        Ok(_) => false,
        Err(ZkappError::Network(NetworkError::NotFound(_))) => true,
        Err(err) => return Err(err.into()),
    };
    let pb = output::spinner("Proving, submitting and waiting for inclusion");
    let outcome = network
        .execute(
            &fee_payer,
            &[&zkapp_key],
            &prover,
            &[zkapp.address],
            |tx| {
                if is_new {
                    tx.fund_new_account()?;
                }
                tx.deploy(&zkapp, &keys.verification_key, &sample::initial_state())
            },
        )
        .await?;
    pb.finish_and_clear();
    report(&outcome)?;

    let before = network
        .fetch_account(&zkapp.address)
        .await?
        .slot(0)
        .unwrap_or_default();
    output::print_key_value("x", &before.to_string());

    output::print_step(3, 4, &format!("Calling update({y})..."));
    let arg = FieldElement::from(y);
    let pb = output::spinner("Proving, submitting and waiting for inclusion");
    let outcome = network
        .execute(&fee_payer, &[], &prover, &[zkapp.address], |tx| {
            tx.call(&zkapp, "update", &[arg])
        })
        .await?;
    pb.finish_and_clear();
    report(&outcome)?;

    output::print_step(4, 4, "Verifying state...");
    let expected = sample::expected_after_update(before, arg);
    network.expect_state(&zkapp, &[("x", expected)]).await?;
    output::print_success(&format!("x == {expected}"));

    Ok(())
}

fn report(outcome: &TransactionOutcome) -> Result<()> {
    output::print_outcome(outcome);
    match outcome {
        TransactionOutcome::Included { .. } => Ok(()),
        TransactionOutcome::Rejected { .. } => anyhow::bail!("transaction rejected"),
        TransactionOutcome::TimedOut { .. } => anyhow::bail!("timed out waiting for inclusion"),
    }
}
