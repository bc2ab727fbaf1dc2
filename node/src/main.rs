// Copyright (c) 2026 RelayHub Contributors. MIT License.
// See LICENSE for details.

//! # RelayHub Node
//!
//! Entry point for the `relayhub-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the hub database and serves the
//! HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     start the node
//! - `init`    create a data directory and a relay key
//! - `decode`  decode a signed raw transaction
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::signal;

use relayhub_contracts::RelayHub;
use relayhub_protocol::config::{HubConfig, PROTOCOL_VERSION};
use relayhub_protocol::crypto::RelayKeypair;
use relayhub_protocol::storage::HubDb;
use relayhub_protocol::transaction::SignedTransaction;

use cli::{Commands, RelayHubCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// File name of the relay key written by `init`.
const RELAY_KEY_FILE: &str = "relay.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RelayHubCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Decode(args) => decode_transaction(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Read the hub config file, if any, and apply CLI overrides.
fn load_config(args: &cli::RunArgs) -> Result<HubConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            HubConfig::from_json(&json)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => HubConfig::default(),
    };
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(hub_address) = args.hub_address {
        config.hub_address = hub_address;
    }
    config.validate().context("invalid hub configuration")?;
    Ok(config)
}

/// Open the hub and serve the API and metrics endpoints until shutdown.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    let config = load_config(&args)?;
    tracing::info!(
        chain_id = config.chain_id,
        hub = %config.hub_address,
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting relayhub-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = Arc::new(
        HubDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );

    let hub = Arc::new(RelayHub::open(config, db).context("failed to open relay hub")?);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    node_metrics
        .registered_relays
        .set(hub.snapshot().registered_relay_count() as i64);

    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        hub,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.listen, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "RPC/API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(node_metrics);
    let metrics_addr = format!("{}:{}", args.listen, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("relayhub-node stopped");
    Ok(())
}

/// Create the data directory and write a fresh relay key into it.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("relayhub_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(RELAY_KEY_FILE);
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            key_path.display()
        );
    }

    let keypair = RelayKeypair::generate();
    std::fs::write(&key_path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write relay key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(address = %keypair.address(), key_path = %key_path.display(), "relay key generated");

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Relay key      : {}", key_path.display());
    println!("  Relay address  : {}", keypair.address());
    Ok(())
}

/// Decode a broadcast transaction and print it with its recovered signer.
fn decode_transaction(args: cli::DecodeArgs) -> Result<()> {
    let digits = args.raw.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    let bytes = hex::decode(digits).context("transaction is not valid hex")?;

    let envelope = SignedTransaction::decode(&bytes).context("failed to decode transaction")?;
    let signer = envelope
        .recover_signer()
        .context("failed to recover transaction signer")?;
    let tx = &envelope.tx;

    let summary = json!({
        "hash": envelope.hash(),
        "signer": signer,
        "nonce": tx.nonce,
        "gasPrice": tx.gas_price.to_string(),
        "gasLimit": tx.gas_limit,
        "to": tx.destination(),
        "value": tx.value.to_string(),
        "data": tx.data,
        "selector": tx.selector().map(hex::encode),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_version() {
    println!("relayhub-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {PROTOCOL_VERSION}");
}

/// Resolves on SIGINT or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
