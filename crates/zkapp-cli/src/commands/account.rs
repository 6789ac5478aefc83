use anyhow::{Context, Result};

use zkapp_core::{Network, NetworkConfig, PublicKey};

use crate::output;

/// Fetch an account from the configured ledger and print it.
pub async fn run(config: NetworkConfig, public_key: &str) -> Result<()> {
    output::print_header("zkapp account");

    if config.is_local() {
        anyhow::bail!("the local ledger only lives for one `zkapp run`; pass --endpoint <url>");
    }
    let public_key: PublicKey = public_key.parse().context("invalid public key")?;
    let network = Network::connect(config)?;
    let record = network.fetch_account(&public_key).await?;

    output::print_key_value("Public key", &record.public_key.to_string());
    output::print_key_value("Balance", &record.balance.to_string());
    output::print_key_value("Nonce", &record.nonce.to_string());
    match &record.verification_key {
        Some(vk) => {
            output::print_key_value("Verification key", &vk.fingerprint.to_string());
            for (index, value) in record.state.iter().enumerate() {
                output::print_key_value(&format!("state[{index}]"), &value.to_string());
            }
        }
        None => output::print_key_value("Contract", "none"),
    }
    Ok(())
}
