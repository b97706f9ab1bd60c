//! Storage module - Block persistence, chain checkpoint and UTXO scans

mod db;
mod state;
mod utxo;

pub use db::*;
pub use state::*;
pub use utxo::*;
