//! Mempool - Pending transactions waiting for a block
//!
//! Keyed by transaction id. Every mutation takes the single internal lock,
//! so a drain is atomic with respect to concurrent snapshots.
//!
//! Inputs of transactions drained into a block that is still being mined stay
//! reserved until the block commits or the transactions are requeued, so no
//! second spend of them can be built in the meantime.

use crate::crypto::Hash;
use crate::storage::OutPoint;
use crate::validation::Tx;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Pool {
    txs: HashMap<Hash, Tx>,
    /// Inputs of drained transactions whose block is not committed yet
    in_flight: HashSet<OutPoint>,
}

/// Set of unconfirmed transactions
#[derive(Debug, Default)]
pub struct Mempool {
    pool: Mutex<Pool>,
}

fn claimed_inputs(tx: &Tx) -> impl Iterator<Item = OutPoint> + '_ {
    tx.tx_ins
        .iter()
        .filter(|input| !input.is_coinbase())
        .map(|input| (input.tx_id, input.index))
}

impl Mempool {
    /// Create an empty mempool
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a locally built, already validated transaction
    pub fn insert(&self, tx: Tx) {
        debug!(tx = %tx.id, "Admitted local transaction");
        self.lock().txs.insert(tx.id, tx);
    }

    /// Insert a transaction relayed by a peer.
    ///
    /// The sender validated it; nothing is re-checked here.
    pub fn admit_from_peer(&self, tx: Tx) {
        debug!(tx = %tx.id, "Admitted relayed transaction");
        self.lock().txs.insert(tx.id, tx);
    }

    /// Take every pending transaction plus a coinbase for `miner_address`
    /// rewarding the block at `height`, leaving the pool empty. The coinbase
    /// is always last.
    ///
    /// The drained inputs stay reserved until `release_in_flight` or
    /// `requeue`.
    pub fn drain_for_block(&self, miner_address: &str, height: u64) -> Vec<Tx> {
        let mut pool = self.lock();
        let mut drained: Vec<Tx> = pool.txs.drain().map(|(_, tx)| tx).collect();
        pool.in_flight = drained.iter().flat_map(claimed_inputs).collect();
        drained.push(Tx::coinbase(miner_address, height));
        drained
    }

    /// Put back the transactions of a block that was never committed
    pub fn requeue(&self, txs: Vec<Tx>) {
        let mut pool = self.lock();
        pool.in_flight.clear();
        for tx in txs.into_iter().filter(|tx| !tx.is_coinbase()) {
            pool.txs.insert(tx.id, tx);
        }
    }

    /// Drop the reservation of drained inputs once their block is on the chain
    pub fn release_in_flight(&self) {
        self.lock().in_flight.clear();
    }

    /// Drop every transaction whose id is in `ids`
    pub fn remove_confirmed<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = Hash>,
    {
        let mut pool = self.lock();
        ids.into_iter().filter(|id| pool.txs.remove(id).is_some()).count()
    }

    /// Outputs already claimed by a pending or in-flight input
    pub fn pending_inputs(&self) -> HashSet<OutPoint> {
        let pool = self.lock();
        pool.txs
            .values()
            .flat_map(claimed_inputs)
            .chain(pool.in_flight.iter().copied())
            .collect()
    }

    /// Copy of every pending transaction, in no particular order
    pub fn snapshot(&self) -> Vec<Tx> {
        self.lock().txs.values().cloned().collect()
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.lock().txs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().txs.is_empty()
    }
}
