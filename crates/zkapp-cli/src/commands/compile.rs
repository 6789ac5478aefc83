use std::path::Path;

use anyhow::Result;

use zkapp_core::sample;

use crate::output;

/// Compile the sample contract, caching its keys under `key_dir`.
pub async fn run(key_dir: &Path) -> Result<()> {
    output::print_header("zkapp compile");

    let definition = sample::simple_zkapp()?;
    let prover = super::prover(key_dir);

    let pb = output::spinner("Compiling");
    let keys = prover.compile(&definition).await?;
    pb.finish_and_clear();

    output::print_success(&format!("Compiled {}", definition.name()));
    output::print_key_value("Fingerprint", &keys.verification_key.fingerprint.to_string());
    output::print_key_value(
        "Verification key",
        &format!("{} bytes", keys.verification_key.data.len()),
    );
    for (name, method) in definition.methods() {
        output::print_key_value(
            &format!("method {name}"),
            &format!(
                "{} param(s), {} constraint(s)",
                method.params.len(),
                method.circuit.constraints.len()
            ),
        );
    }
    output::print_key_value("Key store", &key_dir.display().to_string());
    Ok(())
}
