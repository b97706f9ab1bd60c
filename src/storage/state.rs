//! Chain state management
//!
//! The checkpoint is the only durable head pointer: the full history is
//! reconstructed by walking `prev_hash` links back from `newest_hash`.

use crate::consensus::Block;
use crate::crypto::Hash;
use serde::{Deserialize, Serialize};

/// Head of the chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    /// Hash of the newest block, zero on an empty chain
    pub newest_hash: Hash,
    /// Number of blocks on the chain
    pub height: u64,
    /// Difficulty of the newest block
    pub current_difficulty: u32,
}

impl ChainState {
    /// State of a chain with no blocks yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// State whose head is `block`
    pub fn headed_by(block: &Block) -> Self {
        Self {
            newest_hash: block.hash,
            height: block.height,
            current_difficulty: block.difficulty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    /// Get statistics about the chain state
    pub fn get_stats(&self, mempool_size: usize) -> ChainStats {
        ChainStats {
            height: self.height,
            newest_hash: self.newest_hash,
            current_difficulty: self.current_difficulty,
            mempool_size,
        }
    }
}

/// Statistics about the chain state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub height: u64,
    pub newest_hash: Hash,
    pub current_difficulty: u32,
    pub mempool_size: usize,
}
