//! Block miner implementation
//!
//! Single-threaded proof-of-work search: every attempt stamps the current
//! time, hashes the block and bumps the nonce until the hash carries enough
//! leading zero hex digits or the stop signal is raised.

use crate::consensus::{meets_difficulty, Block};
use crate::validation::unix_now;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mining result
#[derive(Debug)]
pub enum MiningResult {
    /// Successfully mined a block
    Success(Block),
    /// Mining was interrupted
    Interrupted,
}

/// Block miner
#[derive(Debug, Clone, Default)]
pub struct Miner {
    /// Stop signal
    stop_signal: Arc<AtomicBool>,
}

impl Miner {
    /// Create a new miner
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop mining
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Reset stop signal
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    /// Mine a block (find valid nonce)
    ///
    /// The search starts from the block's current nonce and never gives up on
    /// its own; only the stop signal ends it early. `on_progress` gets the
    /// attempt count every `progress_interval` attempts (0 disables it).
    pub fn mine_block<F>(&self, mut block: Block, progress_interval: u64, mut on_progress: F) -> MiningResult
    where
        F: FnMut(u64),
    {
        let mut attempts = 0u64;

        loop {
            if self.stop_signal.load(Ordering::SeqCst) {
                return MiningResult::Interrupted;
            }

            block.timestamp = unix_now();
            let hash = block.compute_hash();

            if meets_difficulty(&hash, block.difficulty) {
                block.hash = hash;
                return MiningResult::Success(block);
            }

            block.nonce = block.nonce.wrapping_add(1);
            attempts += 1;

            if progress_interval > 0 && attempts % progress_interval == 0 {
                on_progress(attempts);
            }
        }
    }
}
