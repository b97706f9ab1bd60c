//! MSSP Ledger Core Library
//!
//! A small single-chain ledger: proof-of-work blocks, a UTXO wallet model,
//! a pending-transaction mempool, and peer reconciliation over TCP.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod mining;
pub mod node;
pub mod p2p;
pub mod rpc;
pub mod storage;
pub mod validation;
pub mod wallet;

/// Protocol constants - changing any of these forks the network
pub mod constants {
    /// Difficulty used for the first block of a fresh chain
    pub const DEFAULT_DIFFICULTY: u32 = 2;

    /// Retarget every this many blocks
    pub const DIFFICULTY_INTERVAL: u64 = 5;

    /// Target minutes between blocks
    pub const BLOCK_INTERVAL_MINUTES: u64 = 2;

    /// Tolerance (minutes) around the expected retarget window
    pub const TIME_RANGE_MINUTES: u64 = 2;

    /// Difficulty never retargets below this
    pub const MIN_DIFFICULTY: u32 = 1;

    /// Fixed coinbase reward per block
    pub const MINER_REWARD: u64 = 50;

    /// Signature sentinel carried by coinbase inputs
    pub const COINBASE_SIGNATURE: &str = "COINBASE";

    /// Output index carried by coinbase inputs
    pub const COINBASE_INDEX: i32 = -1;

    /// Network magic bytes prefixed to every frame ("MSSP")
    pub const PROTOCOL_MAGIC: [u8; 4] = [0x4D, 0x53, 0x53, 0x50];

    /// Maximum frame payload (16 MB, a full chain travels in one frame)
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
}
