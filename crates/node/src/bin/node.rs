//! The Tessera validator node binary.
//!
//! Without an external transport wired in this runs a development chain:
//! with a single-validator genesis the node's own vote is the whole quorum
//! and blocks finalize locally.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tessera_consensus::{ConsensusConfig, EngineState};
use tessera_mempool::{MempoolConfig, MempoolState};
use tessera_node::storage::open_or_recover;
use tessera_node::{
    ChainStore, GenesisConfig, MemoryStore, NodeRunner, NodeStateMachine, NullNetwork,
};
use tessera_types::KeyPair;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tessera-node", about = "Tessera validator node")]
struct Args {
    /// Path to the genesis file (chain id + validator set).
    #[arg(long)]
    genesis: PathBuf,

    /// Hex-encoded 32-byte signing key seed.
    #[arg(long)]
    key_seed: String,

    /// Data directory for the chain store. In-memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// RPC listen address.
    #[arg(long, default_value = "127.0.0.1:26657")]
    rpc_listen: SocketAddr,

    /// Epoch timeout in milliseconds.
    #[arg(long, default_value_t = 6000)]
    epoch_timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!(error = %e, "Node exited with error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let genesis = GenesisConfig::load(&args.genesis)?;
    let validators = genesis.validator_set()?;

    let seed_bytes = hex::decode(args.key_seed.trim_start_matches("0x"))?;
    let seed: [u8; 32] = seed_bytes
        .try_into()
        .map_err(|_| "key seed must be 32 bytes")?;
    let key = KeyPair::from_seed(&seed);

    if !validators.contains(&key.address()) {
        return Err(format!("local key {} is not in the validator set", key.address()).into());
    }

    let mut storage: Box<dyn ChainStore> = match &args.data_dir {
        Some(dir) => Box::new(open_or_recover(dir.join("chain.db"))?),
        None => Box::new(MemoryStore::new()),
    };
    storage.set_validators(&validators)?;
    let recovered = storage.recover()?;

    let consensus_config = ConsensusConfig {
        epoch_timeout: Duration::from_millis(args.epoch_timeout_ms),
        ..Default::default()
    };

    info!(
        chain_id = genesis.chain_id,
        validator = %key.address(),
        validators = validators.len(),
        recovered_height = recovered.finalized_blocks.len(),
        "Starting node"
    );

    let engine = EngineState::new(
        &genesis.chain_id,
        key,
        validators,
        consensus_config,
        recovered,
    );
    let node = NodeStateMachine::new(engine, MempoolState::new(MempoolConfig::default()));

    let (runner, handle, _inbound, mut finalized_rx) = NodeRunner::new(
        node,
        Arc::new(NullNetwork),
        storage,
        tessera_node::runner::DEFAULT_QUEUE_CAPACITY,
    );

    // Advisory finalized stream: log progress.
    tokio::spawn(async move {
        while let Some(block) = finalized_rx.recv().await {
            info!(
                height = block.height(),
                block = ?block.hash(),
                transactions = block.transactions.len(),
                "Block finalized"
            );
        }
    });

    // RPC server.
    let rpc_handle = handle.clone();
    let rpc_listen = args.rpc_listen;
    tokio::spawn(async move {
        if let Err(e) = tessera_node::rpc::serve(rpc_handle, rpc_listen).await {
            error!(error = %e, "RPC server exited");
        }
    });

    // Shut down cleanly on ctrl-c.
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_handle.shutdown();
        }
    });

    runner.run().await;
    Ok(())
}
