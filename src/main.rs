//! MSSP Ledger Node
//!
//! Main entry point: opens the chain, starts the P2P listener and the REST
//! API, dials any startup peers and runs until Ctrl+C.

use clap::Parser;
use mssp_core::config::NodeConfig;
use mssp_core::node::Node;
use mssp_core::p2p;
use mssp_core::rpc::start_rest_server;
use mssp_core::storage::{BlockStore, SledStore};
use mssp_core::wallet::{SigningService, Wallet};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SledStore::open(config.db_path())?);
    let wallet: Arc<dyn SigningService> = Arc::new(Wallet::load_or_create(config.wallet_path())?);

    let node = Node::new(store.clone(), wallet, config.p2p_port)?;
    let status = node.chain_status();
    info!(
        height = status.height,
        newest = %status.newest_hash,
        difficulty = status.current_difficulty,
        wallet = %node.wallet_address(),
        "Node ready"
    );

    let p2p_task = tokio::spawn(p2p::listen(node.clone(), config.p2p_port));
    let rest_task = tokio::spawn(start_rest_server(node.clone(), config.http_port));

    for (host, port) in config.bootstrap_peers()? {
        if let Err(e) = node.connect_to_peer(&host, port).await {
            warn!(%host, port, error = %e, "Startup peer unreachable");
        }
    }

    tokio::select! {
        result = p2p_task => {
            error!(?result, "P2P listener stopped");
        }
        result = rest_task => {
            error!(?result, "REST server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping node");
            node.chain().miner().stop();
        }
    }

    store.flush()?;
    Ok(())
}
