//! Node configuration
//!
//! Runtime settings come from the command line; protocol constants live in
//! `crate::constants`.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid peer address '{0}', expected HOST:PORT")]
    InvalidPeer(String),
}

/// Command line options for `mssp-node`
#[derive(Debug, Clone, Parser)]
#[command(name = "mssp-node", version, about = "MSSP ledger node")]
pub struct NodeConfig {
    /// Port of the REST API
    #[arg(long, default_value_t = 4000)]
    pub http_port: u16,

    /// Port peers connect to
    #[arg(long, default_value_t = 5000)]
    pub p2p_port: u16,

    /// Directory holding the database and wallet
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Wallet key file, relative to the data directory unless absolute
    #[arg(long, default_value = "mssp.wallet")]
    pub wallet: PathBuf,

    /// Peer to connect to at startup (repeatable)
    #[arg(long = "peer", value_name = "HOST:PORT")]
    pub peers: Vec<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl NodeConfig {
    /// One database per REST port, so several nodes can share a directory
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("blockchain_{}.db", self.http_port))
    }

    pub fn wallet_path(&self) -> PathBuf {
        if self.wallet.is_absolute() {
            self.wallet.clone()
        } else {
            self.data_dir.join(&self.wallet)
        }
    }

    /// Startup peers as (host, port)
    pub fn bootstrap_peers(&self) -> Result<Vec<(String, u16)>, ConfigError> {
        self.peers
            .iter()
            .map(|peer| {
                peer.rsplit_once(':')
                    .filter(|(host, _)| !host.is_empty())
                    .and_then(|(host, port)| Some((host.to_string(), port.parse().ok()?)))
                    .ok_or_else(|| ConfigError::InvalidPeer(peer.clone()))
            })
            .collect()
    }
}
