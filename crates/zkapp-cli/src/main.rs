//! zkapp CLI: deploy and update proof-backed contracts against a ledger.
//!
//! Commands: `run` (deploy `SimpleZkapp`, call `update`, verify the result),
//! `account`, `compile` and `keygen`. The ledger endpoint is the single
//! external configuration point; `--endpoint local` runs against an
//! in-process ledger.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "zkapp",
    about = "Deploy and update zero-knowledge smart contracts",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to zkapp.config.json (defaults are used if it does not exist)
    #[arg(long, global = true, default_value = "zkapp.config.json")]
    config: PathBuf,

    /// Ledger JSON-RPC endpoint, or `local` for an in-process ledger
    #[arg(long, global = true, env = "ZKAPP_ENDPOINT")]
    endpoint: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy SimpleZkapp, call update(y) and check that x became x + y
    Run {
        /// Fee payer secret key (hex). Generated and funded on the local ledger if omitted.
        #[arg(long, env = "ZKAPP_FEE_PAYER_KEY", hide_env_values = true)]
        fee_payer_key: Option<String>,

        /// zkapp account secret key (hex). A fresh account is created if omitted.
        #[arg(long, env = "ZKAPP_KEY", hide_env_values = true)]
        zkapp_key: Option<String>,

        /// Argument passed to update
        #[arg(long, default_value = "4")]
        y: u64,

        /// Directory for cached proving and verification keys
        #[arg(long, default_value = ".zkapp/keys")]
        key_dir: PathBuf,
    },

    /// Fetch and print an account from the ledger
    Account {
        /// Account public key (hex)
        public_key: String,
    },

    /// Compile SimpleZkapp and print its verification key fingerprint
    Compile {
        /// Directory for cached proving and verification keys
        #[arg(long, default_value = ".zkapp/keys")]
        key_dir: PathBuf,
    },

    /// Generate a new account keypair
    Keygen,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            fee_payer_key,
            zkapp_key,
            y,
            key_dir,
        } => {
            let config = commands::load_config(&cli.config, cli.endpoint)?;
            commands::run::run(
                config,
                fee_payer_key.as_deref(),
                zkapp_key.as_deref(),
                y,
                &key_dir,
            )
            .await?;
        }
        Commands::Account { public_key } => {
            let config = commands::load_config(&cli.config, cli.endpoint)?;
            commands::account::run(config, &public_key).await?;
        }
        Commands::Compile { key_dir } => {
            commands::compile::run(&key_dir).await?;
        }
        Commands::Keygen => {
            commands::keygen::run();
        }
    }

    Ok(())
}
