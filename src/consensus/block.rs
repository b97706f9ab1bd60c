//! Block structure for the ledger
//!
//! A block is immutable once mined: its `hash` equals the canonical content
//! hash of every other field.

use crate::crypto::{CanonicalEncoder, Hash};
use crate::validation::Tx;
use serde::{Deserialize, Serialize};

/// A block of transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Transactions, coinbase last for locally mined blocks
    pub transactions: Vec<Tx>,
    /// Content hash, zero until mined
    pub hash: Hash,
    /// Hash of the previous block, zero for the first block
    pub prev_hash: Hash,
    /// Position on the chain, starting at 1
    pub height: u64,
    /// Required leading zero hex digits
    pub difficulty: u32,
    /// Nonce used for PoW
    pub nonce: u64,
    /// Unix seconds of the winning mining attempt
    pub timestamp: u64,
}

impl Block {
    /// Create an unmined block
    pub fn new(prev_hash: Hash, height: u64, difficulty: u32, transactions: Vec<Tx>) -> Self {
        Self {
            transactions,
            hash: Hash::zero(),
            prev_hash,
            height,
            difficulty,
            nonce: 0,
            timestamp: 0,
        }
    }

    /// Content hash over every field except `hash`.
    ///
    /// Layout: prev_hash, height, difficulty, nonce, timestamp, tx count,
    /// then each transaction's full encoding.
    pub fn compute_hash(&self) -> Hash {
        let mut enc = CanonicalEncoder::new();
        enc.put_hash(&self.prev_hash)
            .put_u64(self.height)
            .put_u32(self.difficulty)
            .put_u64(self.nonce)
            .put_u64(self.timestamp)
            .put_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            tx.encode_into(&mut enc);
        }
        enc.digest()
    }

    /// Check if this is the first block of its chain
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    /// True when `hash` is set, matches the content and meets the difficulty
    pub fn is_mined(&self) -> bool {
        !self.hash.is_zero()
            && self.hash == self.compute_hash()
            && meets_difficulty(&self.hash, self.difficulty)
    }

    /// Ids of every transaction in the block
    pub fn tx_ids(&self) -> impl Iterator<Item = Hash> + '_ {
        self.transactions.iter().map(|tx| tx.id)
    }
}

/// Does `hash` start with at least `difficulty` zero hex digits?
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash.leading_zero_nibbles() >= difficulty
}
