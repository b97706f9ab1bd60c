//! Chain core
//!
//! Owns the head pointer and every transition on it. Writers persist the
//! block and checkpoint first and only then swap the in-memory state, all
//! under the write lock. Lock order is chain first, then mempool.

use crate::consensus::{next_difficulty, Block};
use crate::constants::DIFFICULTY_INTERVAL;
use crate::crypto::Hash;
use crate::mempool::Mempool;
use crate::mining::{Miner, MiningResult};
use crate::storage::{
    balance_of, index_transactions, unspent_outputs_of, BlockStore, ChainState, ChainStats,
    StorageError,
};
use crate::validation::{build_transaction, Tx, TxError, UTxOut};
use crate::wallet::SigningService;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts between mining progress logs
const MINING_PROGRESS_INTERVAL: u64 = 100_000;

/// Chain errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Block not found: {0}")]
    NotFound(Hash),
    #[error("Chain has no blocks")]
    EmptyChain,
    #[error("Replacement chain is empty")]
    EmptyReplacement,
    #[error("Mining interrupted by a competing block")]
    MiningInterrupted,
    #[error(transparent)]
    Transaction(#[from] TxError),
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// The local chain
pub struct Blockchain {
    state: RwLock<ChainState>,
    store: Arc<dyn BlockStore>,
    mempool: Arc<Mempool>,
    miner: Miner,
    /// Serializes local mining
    mining: Mutex<()>,
}

impl Blockchain {
    /// Resume from the stored checkpoint, or mine the first block for
    /// `miner_address` when there is none.
    pub fn open(
        store: Arc<dyn BlockStore>,
        mempool: Arc<Mempool>,
        miner_address: &str,
    ) -> Result<Self, ChainError> {
        let state = store.get_checkpoint()?.unwrap_or_else(ChainState::empty);
        let chain = Self {
            state: RwLock::new(state),
            store,
            mempool,
            miner: Miner::new(),
            mining: Mutex::new(()),
        };

        if chain.read().is_empty() {
            info!("No checkpoint found, mining the first block");
            chain.grow(miner_address)?;
        } else {
            let state = chain.read();
            info!(height = state.height, newest = %state.newest_hash, "Loaded chain checkpoint");
        }

        Ok(chain)
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current head
    pub fn state(&self) -> ChainState {
        self.read().clone()
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn status(&self) -> ChainStats {
        let stats = self.read().get_stats(0);
        ChainStats {
            mempool_size: self.mempool.len(),
            ..stats
        }
    }

    /// Walk back from `state.newest_hash`, newest first, at most `limit` blocks
    fn walk(&self, state: &ChainState, limit: Option<usize>) -> Result<Vec<Block>, ChainError> {
        let mut blocks = Vec::new();
        if state.is_empty() {
            return Ok(blocks);
        }

        let mut hash = state.newest_hash;
        loop {
            if limit.map_or(false, |l| blocks.len() >= l) {
                break;
            }
            let block = self.store.get_block(&hash)?.ok_or(ChainError::NotFound(hash))?;
            let done = block.is_genesis();
            hash = block.prev_hash;
            blocks.push(block);
            if done {
                break;
            }
        }
        Ok(blocks)
    }

    /// Every block, newest first, read under one consistent head
    pub fn blocks_from_newest(&self) -> Result<Vec<Block>, ChainError> {
        let state = self.read();
        self.walk(&state, None)
    }

    pub fn newest_block(&self) -> Result<Block, ChainError> {
        let state = self.read();
        if state.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        self.store
            .get_block(&state.newest_hash)?
            .ok_or(ChainError::NotFound(state.newest_hash))
    }

    pub fn find_block(&self, hash: &Hash) -> Result<Block, ChainError> {
        self.store.get_block(hash)?.ok_or(ChainError::NotFound(*hash))
    }

    /// First transaction with `id` on the chain, scanning newest first
    pub fn find_transaction(&self, id: &Hash) -> Result<Option<Tx>, ChainError> {
        let blocks = self.blocks_from_newest()?;
        Ok(blocks
            .into_iter()
            .flat_map(|b| b.transactions.into_iter())
            .find(|tx| tx.id == *id))
    }

    /// Spendable outputs of `address`
    pub fn unspent_outputs(&self, address: &str) -> Result<Vec<UTxOut>, ChainError> {
        let state = self.read();
        let blocks = self.walk(&state, None)?;
        let pending = self.mempool.pending_inputs();
        Ok(unspent_outputs_of(&blocks, &pending, address))
    }

    pub fn balance(&self, address: &str) -> Result<u64, ChainError> {
        let state = self.read();
        let blocks = self.walk(&state, None)?;
        let pending = self.mempool.pending_inputs();
        Ok(balance_of(&blocks, &pending, address))
    }

    /// Build a signed transaction from the signer's address.
    ///
    /// Selection and validation see the same chain snapshot.
    pub fn build_transaction(
        &self,
        to: &str,
        amount: u64,
        signer: &dyn SigningService,
    ) -> Result<Tx, ChainError> {
        let state = self.read();
        let blocks = self.walk(&state, None)?;
        let pending = self.mempool.pending_inputs();
        let from = signer.address();

        let unspent = unspent_outputs_of(&blocks, &pending, from);
        let index = index_transactions(&blocks);
        let tx = build_transaction(&unspent, from, to, amount, signer, |id| {
            index.get(id).map(|tx| (*tx).clone())
        })?;
        Ok(tx)
    }

    /// Mine the next block on top of the current head with every pending
    /// transaction plus a coinbase for `miner_address`.
    ///
    /// Blocks the calling thread for the whole search. Fails with
    /// `MiningInterrupted` if a peer block or replacement lands first; the
    /// drained transactions go back to the mempool in that case.
    pub fn grow(&self, miner_address: &str) -> Result<Block, ChainError> {
        let _mining = self.mining.lock().unwrap_or_else(|e| e.into_inner());
        self.miner.reset();

        let (base, candidate) = {
            let state = self.read();
            let recent = self.walk(&state, Some(DIFFICULTY_INTERVAL as usize))?;
            let difficulty = next_difficulty(&state, &recent);
            let transactions = self.mempool.drain_for_block(miner_address, state.height + 1);
            (
                state.newest_hash,
                Block::new(state.newest_hash, state.height + 1, difficulty, transactions),
            )
        };
        let drained = candidate.transactions.clone();

        debug!(height = candidate.height, difficulty = candidate.difficulty, txs = drained.len(), "Mining block");
        let block = match self.miner.mine_block(candidate, MINING_PROGRESS_INTERVAL, |n| {
            debug!(attempts = n, "Still mining")
        }) {
            MiningResult::Success(block) => block,
            MiningResult::Interrupted => {
                warn!("Mining interrupted, returning transactions to the mempool");
                self.requeue_unconfirmed(drained)?;
                return Err(ChainError::MiningInterrupted);
            }
        };

        let mut state = self.write();
        if state.newest_hash != base {
            drop(state);
            warn!(hash = %block.hash, "Head moved while mining, discarding block");
            self.requeue_unconfirmed(drained)?;
            return Err(ChainError::MiningInterrupted);
        }

        let next = ChainState::headed_by(&block);
        self.store.put_block(&block)?;
        self.store.put_checkpoint(&next)?;
        *state = next;
        self.mempool.release_in_flight();

        info!(height = block.height, hash = %block.hash, difficulty = block.difficulty, "Mined block");
        Ok(block)
    }

    /// Put back drained transactions the current chain does not already hold
    fn requeue_unconfirmed(&self, txs: Vec<Tx>) -> Result<(), ChainError> {
        let state = self.read();
        let blocks = self.walk(&state, None)?;
        let confirmed: HashSet<Hash> = blocks.iter().flat_map(|b| b.tx_ids()).collect();
        self.mempool
            .requeue(txs.into_iter().filter(|tx| !confirmed.contains(&tx.id)).collect());
        Ok(())
    }

    /// Adopt a peer's chain (newest first) wholesale.
    ///
    /// Nothing in `blocks` is verified.
    pub fn replace(&self, blocks: &[Block]) -> Result<(), ChainError> {
        let newest = blocks.first().ok_or(ChainError::EmptyReplacement)?;
        let next = ChainState::headed_by(newest);
        self.miner.stop();

        let mut state = self.write();
        self.store.clear_blocks()?;
        for block in blocks {
            self.store.put_block(block)?;
        }
        self.store.put_checkpoint(&next)?;
        self.store.flush()?;
        *state = next;

        info!(height = state.height, newest = %state.newest_hash, "Replaced chain");
        Ok(())
    }

    /// Put a peer's new block on top of the chain and confirm its
    /// transactions out of the mempool.
    ///
    /// Neither the proof of work nor the link to the current head is checked.
    pub fn append_peer_block(&self, block: &Block) -> Result<(), ChainError> {
        self.miner.stop();

        let mut state = self.write();
        let next = ChainState {
            newest_hash: block.hash,
            height: state.height + 1,
            current_difficulty: block.difficulty,
        };
        self.store.put_block(block)?;
        self.store.put_checkpoint(&next)?;
        *state = next;

        let confirmed = self.mempool.remove_confirmed(block.tx_ids());
        info!(height = state.height, hash = %block.hash, confirmed, "Appended peer block");
        Ok(())
    }
}
