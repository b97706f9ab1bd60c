//! Database persistence layer using Sled
//!
//! Blocks live in the `blocks` tree keyed by raw hash bytes; the chain
//! checkpoint lives in the `data` tree under a single key.

use crate::consensus::Block;
use crate::crypto::{from_bytes, to_bytes, Hash};
use crate::storage::ChainState;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key/value operations the chain depends on
pub trait BlockStore: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<(), StorageError>;
    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;
    fn put_checkpoint(&self, state: &ChainState) -> Result<(), StorageError>;
    fn get_checkpoint(&self) -> Result<Option<ChainState>, StorageError>;
    /// Remove every persisted block, leaving the checkpoint alone
    fn clear_blocks(&self) -> Result<(), StorageError>;
    fn flush(&self) -> Result<(), StorageError>;
}

const CHECKPOINT_KEY: &str = "checkpoint";

/// Sled-backed store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    blocks_tree: Tree,
    data_tree: Tree,
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree("blocks")?;
        let data_tree = db.open_tree("data")?;

        Ok(Self {
            db,
            blocks_tree,
            data_tree,
        })
    }
}

impl BlockStore for SledStore {
    fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = to_bytes(block)?;
        self.blocks_tree.insert(block.hash.0, value)?;
        Ok(())
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        match self.blocks_tree.get(hash.0)? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_checkpoint(&self, state: &ChainState) -> Result<(), StorageError> {
        let value = to_bytes(state)?;
        self.data_tree.insert(CHECKPOINT_KEY, value)?;
        self.db.flush()?;
        Ok(())
    }

    fn get_checkpoint(&self) -> Result<Option<ChainState>, StorageError> {
        match self.data_tree.get(CHECKPOINT_KEY)? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn clear_blocks(&self) -> Result<(), StorageError> {
        self.blocks_tree.clear()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Ephemeral store for tests and throwaway nodes
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<HashMap<Hash, Vec<u8>>>,
    checkpoint: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted blocks
    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl BlockStore for MemoryStore {
    fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = to_bytes(block)?;
        self.blocks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(block.hash, value);
        Ok(())
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        match blocks.get(hash) {
            Some(bytes) => Ok(Some(from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    fn put_checkpoint(&self, state: &ChainState) -> Result<(), StorageError> {
        let value = to_bytes(state)?;
        *self.checkpoint.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
        Ok(())
    }

    fn get_checkpoint(&self) -> Result<Option<ChainState>, StorageError> {
        let checkpoint = self.checkpoint.lock().unwrap_or_else(|e| e.into_inner());
        match checkpoint.as_deref() {
            Some(bytes) => Ok(Some(from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    fn clear_blocks(&self) -> Result<(), StorageError> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Tx;

    fn sample_block(height: u64) -> Block {
        let mut block = Block::new(Hash::zero(), height, 0, vec![Tx::coinbase_at("miner", height, height)]);
        block.hash = block.compute_hash();
        block
    }

    fn exercise(store: &dyn BlockStore) {
        let block = sample_block(1);
        assert!(store.get_block(&block.hash).unwrap().is_none());

        store.put_block(&block).unwrap();
        assert_eq!(store.get_block(&block.hash).unwrap(), Some(block.clone()));

        assert!(store.get_checkpoint().unwrap().is_none());
        let state = ChainState {
            newest_hash: block.hash,
            height: 1,
            current_difficulty: 2,
        };
        store.put_checkpoint(&state).unwrap();
        assert_eq!(store.get_checkpoint().unwrap(), Some(state.clone()));

        store.clear_blocks().unwrap();
        assert!(store.get_block(&block.hash).unwrap().is_none());
        assert_eq!(store.get_checkpoint().unwrap(), Some(state));
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path().join("chain.db")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let block = sample_block(3);

        {
            let store = SledStore::open(&path).unwrap();
            store.put_block(&block).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(&path).unwrap();
        assert_eq!(store.get_block(&block.hash).unwrap(), Some(block));
    }
}
