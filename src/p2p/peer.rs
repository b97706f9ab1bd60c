//! Peer management
//!
//! Connected peers keyed by `address:port`. Each peer owns an unbounded
//! outbound queue drained by its writer task, so enqueueing never waits on
//! the network.

use super::protocol::Message;
use crate::consensus::Block;
use crate::validation::Tx;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// A connected peer
#[derive(Debug, Clone)]
pub struct Peer {
    /// `address:port`
    pub key: String,
    /// Distinguishes successive connections under the same key
    pub conn_id: u64,
    outbound: UnboundedSender<Message>,
}

impl Peer {
    /// Port part of the key: the peer's own listening port
    pub fn port(&self) -> &str {
        self.key.rsplit(':').next().unwrap_or_default()
    }

    /// Queue a message for the writer. False once the writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Shared set of connected peers
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<Mutex<HashMap<String, Peer>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl PeerSet {
    /// Create an empty peer set
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Peer>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a connection under `key`, replacing any previous one.
    ///
    /// Returns the new connection id, needed to remove it later.
    pub fn register(&self, key: &str, outbound: UnboundedSender<Message>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let peer = Peer {
            key: key.to_string(),
            conn_id,
            outbound,
        };
        if self.lock().insert(key.to_string(), peer).is_some() {
            debug!(peer = %key, "Replaced existing connection");
        }
        conn_id
    }

    /// Remove `key` if it still belongs to connection `conn_id`
    pub fn remove(&self, key: &str, conn_id: u64) -> bool {
        let mut peers = self.lock();
        match peers.get(key) {
            Some(peer) if peer.conn_id == conn_id => {
                peers.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Queue a message for one peer
    pub fn send_to(&self, key: &str, message: Message) -> bool {
        self.lock().get(key).map_or(false, |peer| peer.send(message))
    }

    /// Queue a message for every peer; returns how many accepted it
    pub fn broadcast(&self, message: &Message) -> usize {
        self.lock()
            .values()
            .filter(|p| p.send(message.clone()))
            .count()
    }

    pub fn broadcast_new_block(&self, block: &Block) -> usize {
        self.broadcast(&Message::NewBlockNotify(block.clone()))
    }

    pub fn broadcast_new_tx(&self, tx: &Tx) -> usize {
        self.broadcast(&Message::NewTxNotify(tx.clone()))
    }

    /// Tell everyone but the new peer itself to connect to it.
    ///
    /// Each recipient gets `new_key:its_own_port`, the port it should
    /// announce when dialing.
    pub fn broadcast_new_peer(&self, new_key: &str) -> usize {
        let peers = self.lock();
        peers
            .values()
            .filter(|p| p.key != new_key)
            .filter(|p| {
                let announcement = format!("{}:{}", new_key, p.port());
                p.send(Message::NewPeerNotify(announcement))
            })
            .count()
    }

    /// Keys of every connected peer, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}
