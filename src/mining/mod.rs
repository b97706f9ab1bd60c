//! Mining module - Cancellable proof-of-work search

mod miner;

pub use miner::*;
