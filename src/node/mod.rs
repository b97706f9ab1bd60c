//! Node module - Chain core and the operations exposed to REST and peers
//!
//! `Node` is a cheap handle: every field is shared, so it is cloned into
//! each connection task and HTTP handler.

mod chain;

pub use chain::*;

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::mempool::Mempool;
use crate::p2p::{self, Message, PeerAnnouncement, PeerSet, ProtocolError};
use crate::storage::{BlockStore, ChainStats};
use crate::validation::{Tx, UTxOut};
use crate::wallet::SigningService;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("Peer protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl NodeError {
    /// Lookup misses
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::Chain(ChainError::NotFound(_)))
    }

    /// Errors caused by what a peer sent; the session with that peer ends
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            NodeError::Protocol(_) | NodeError::Chain(ChainError::EmptyReplacement)
        )
    }
}

/// Stop the process on a storage failure inside a chain mutation, so no
/// reader ever sees memory and disk disagree.
fn halt_on_storage_failure<T>(result: Result<T, ChainError>) -> Result<T, NodeError> {
    match result {
        Err(ChainError::Storage(e)) => {
            error!(error = %e, "Storage failure during chain mutation, stopping node");
            std::process::exit(1);
        }
        other => Ok(other?),
    }
}

/// A running ledger node
#[derive(Clone)]
pub struct Node {
    chain: Arc<Blockchain>,
    mempool: Arc<Mempool>,
    signer: Arc<dyn SigningService>,
    peers: PeerSet,
    /// Serializes transaction admission
    admission: Arc<Mutex<()>>,
    open_port: u16,
}

impl Node {
    /// Open the chain in `store`, mining the first block if it is empty.
    ///
    /// `open_port` is the P2P port this node listens on.
    pub fn new(
        store: Arc<dyn BlockStore>,
        signer: Arc<dyn SigningService>,
        open_port: u16,
    ) -> Result<Self, NodeError> {
        let mempool = Arc::new(Mempool::new());
        let chain = halt_on_storage_failure(Blockchain::open(
            store,
            Arc::clone(&mempool),
            signer.address(),
        ))?;

        Ok(Self {
            chain: Arc::new(chain),
            mempool,
            signer,
            peers: PeerSet::new(),
            admission: Arc::new(Mutex::new(())),
            open_port,
        })
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn open_port(&self) -> u16 {
        self.open_port
    }

    /// Mine a block from the mempool and announce it.
    ///
    /// The search runs on the blocking pool; the caller waits for it.
    pub async fn add_local_block(&self) -> Result<Block, NodeError> {
        let chain = Arc::clone(&self.chain);
        let address = self.signer.address().to_string();
        let mined = tokio::task::spawn_blocking(move || chain.grow(&address)).await?;
        let block = halt_on_storage_failure(mined)?;

        self.peers.broadcast_new_block(&block);
        Ok(block)
    }

    pub fn get_blocks(&self) -> Result<Vec<Block>, NodeError> {
        Ok(self.chain.blocks_from_newest()?)
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Block, NodeError> {
        Ok(self.chain.find_block(hash)?)
    }

    pub fn newest_block(&self) -> Result<Block, NodeError> {
        Ok(self.chain.newest_block()?)
    }

    pub fn chain_status(&self) -> ChainStats {
        self.chain.status()
    }

    pub fn balance(&self, address: &str) -> Result<u64, NodeError> {
        Ok(self.chain.balance(address)?)
    }

    pub fn unspent_outputs(&self, address: &str) -> Result<Vec<UTxOut>, NodeError> {
        Ok(self.chain.unspent_outputs(address)?)
    }

    /// Build a transaction from the local wallet, admit it and relay it
    pub fn submit_transaction(&self, to: &str, amount: u64) -> Result<Tx, NodeError> {
        let tx = {
            let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
            let tx = self.chain.build_transaction(to, amount, self.signer.as_ref())?;
            self.mempool.insert(tx.clone());
            tx
        };
        info!(tx = %tx.id, to, amount, "Transaction admitted");

        self.peers.broadcast_new_tx(&tx);
        Ok(tx)
    }

    pub fn mempool(&self) -> Vec<Tx> {
        self.mempool.snapshot()
    }

    pub fn wallet_address(&self) -> String {
        self.signer.address().to_string()
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers.keys()
    }

    /// Dial a peer on request, tell every other peer about it and start
    /// reconciling with it.
    ///
    /// Unlike a bare fan-out dial, the requested peer also gets our newest
    /// block right away, so an operator-added peer syncs without waiting for
    /// a later announcement.
    pub async fn connect_to_peer(&self, address: &str, port: u16) -> Result<(), NodeError> {
        let key = p2p::dial(self, address, port, self.open_port).await?;
        self.peers.broadcast_new_peer(&key);
        self.send_newest_block(&key)
    }

    /// Dial a peer learned from another peer. Nothing is re-broadcast.
    pub async fn connect_to_announced(&self, announcement: &PeerAnnouncement) -> Result<(), NodeError> {
        let key = p2p::dial(
            self,
            &announcement.address,
            announcement.port,
            announcement.open_port,
        )
        .await?;
        self.send_newest_block(&key)
    }

    pub(crate) fn send_newest_block(&self, key: &str) -> Result<(), NodeError> {
        let newest = self.chain.newest_block()?;
        self.peers.send_to(key, Message::NewestBlock(newest));
        Ok(())
    }

    /// Register a connection; returns its id for `on_peer_disconnected`
    pub fn on_peer_connected(&self, key: &str, outbound: UnboundedSender<Message>) -> u64 {
        info!(peer = %key, "Peer connected");
        self.peers.register(key, outbound)
    }

    pub async fn on_message_received(&self, key: &str, message: Message) -> Result<(), NodeError> {
        p2p::handle_message(self, key, message).await
    }

    pub fn on_peer_disconnected(&self, key: &str, conn_id: u64) {
        if self.peers.remove(key, conn_id) {
            info!(peer = %key, "Peer disconnected");
        }
    }

    pub(crate) fn replace_chain(&self, blocks: &[Block]) -> Result<(), NodeError> {
        halt_on_storage_failure(self.chain.replace(blocks))
    }

    pub(crate) fn append_peer_block(&self, block: &Block) -> Result<(), NodeError> {
        halt_on_storage_failure(self.chain.append_peer_block(block))
    }

    pub(crate) fn admit_from_peer(&self, tx: Tx) {
        self.mempool.admit_from_peer(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MINER_REWARD;
    use crate::storage::MemoryStore;
    use crate::wallet::Wallet;
    use tokio::sync::mpsc::unbounded_channel;

    fn node() -> Node {
        Node::new(Arc::new(MemoryStore::new()), Arc::new(Wallet::generate()), 0).unwrap()
    }

    #[tokio::test]
    async fn test_add_local_block_broadcasts() {
        let node = node();
        let (tx, mut rx) = unbounded_channel();
        node.on_peer_connected("10.0.0.2:5000", tx);

        let block = node.add_local_block().await.unwrap();
        assert_eq!(block.height, 2);
        assert_eq!(rx.recv().await, Some(Message::NewBlockNotify(block)));
    }

    #[tokio::test]
    async fn test_submit_transaction_relays_and_pends() {
        let node = node();
        let (tx, mut rx) = unbounded_channel();
        node.on_peer_connected("10.0.0.2:5000", tx);

        let pending = node.submit_transaction("bob", 20).unwrap();
        assert_eq!(node.mempool(), vec![pending.clone()]);
        assert_eq!(rx.recv().await, Some(Message::NewTxNotify(pending)));
        assert_eq!(node.chain_status().mempool_size, 1);
    }

    #[test]
    fn test_second_spend_sees_pending_inputs() {
        let node = node();
        node.submit_transaction("bob", 20).unwrap();

        // the only output is claimed by the pending transaction
        let err = node.submit_transaction("bob", 20).unwrap_err();
        assert!(matches!(
            err,
            NodeError::Chain(ChainError::Transaction(crate::validation::TxError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn test_wallet_balance_and_lookup() {
        let node = node();
        let address = node.wallet_address();
        assert_eq!(node.balance(&address).unwrap(), MINER_REWARD);
        assert_eq!(node.unspent_outputs(&address).unwrap().len(), 1);

        let newest = node.newest_block().unwrap();
        assert_eq!(node.get_block(&newest.hash).unwrap(), newest);
        assert!(node.get_block(&Hash::zero()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_disconnect_removes_peer() {
        let node = node();
        let (tx, _rx) = unbounded_channel();
        let id = node.on_peer_connected("10.0.0.2:5000", tx);
        assert_eq!(node.list_peers(), vec!["10.0.0.2:5000".to_string()]);

        node.on_peer_disconnected("10.0.0.2:5000", id);
        assert!(node.list_peers().is_empty());
    }
}
