use zkapp_core::Keypair;

use crate::output;

/// Print a fresh keypair.
pub fn run() {
    output::print_header("zkapp keygen");
    let keypair = Keypair::generate();
    output::print_key_value("Public key", &keypair.public_key().to_string());
    output::print_key_value("Secret key", &keypair.secret_hex());
    output::print_warning("store the secret key somewhere safe; it is not saved");
}
