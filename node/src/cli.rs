//! # CLI Interface
//!
//! Command-line arguments for `relayhub-node`, defined with `clap` derive.
//! Subcommands: `run`, `init`, `decode` and `version`.

use std::path::PathBuf;

use alloy_primitives::Address;
use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// RelayHub ledger node.
///
/// Hosts a relay hub: relays stake and register, senders' requests are
/// forwarded, and anyone can submit proofs of relay misbehavior. Serves
/// JSON-RPC, REST and a WebSocket event feed, plus Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "relayhub-node",
    about = "RelayHub ledger node",
    version,
    propagate_version = true
)]
pub struct RelayHubCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create a data directory and a fresh relay key.
    Init(InitArgs),
    /// Decode a signed raw transaction and print its recovered signer.
    Decode(DecodeArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Hub configuration file (JSON). Missing fields take their defaults.
    #[arg(long, short = 'c', env = "RELAYHUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the hub database.
    #[arg(long, short = 'd', env = "RELAYHUB_DATA_DIR", default_value = "./relayhub-data")]
    pub data_dir: PathBuf,

    /// Interface to bind both listeners on.
    #[arg(long, env = "RELAYHUB_LISTEN", default_value = "0.0.0.0")]
    pub listen: String,

    /// Port for the JSON-RPC, REST and WebSocket API.
    #[arg(long, env = "RELAYHUB_RPC_PORT", default_value_t = 8090)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "RELAYHUB_METRICS_PORT", default_value_t = 8091)]
    pub metrics_port: u16,

    /// Override the configured chain id.
    #[arg(long, env = "RELAYHUB_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Override the configured hub address.
    #[arg(long, env = "RELAYHUB_HUB_ADDRESS")]
    pub hub_address: Option<Address>,

    #[arg(long, value_enum, env = "RELAYHUB_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Arguments for `init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "RELAYHUB_DATA_DIR", default_value = "./relayhub-data")]
    pub data_dir: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `decode`.
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded signed transaction, with or without `0x`.
    pub raw: String,
}
