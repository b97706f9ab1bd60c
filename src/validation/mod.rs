//! Validation module - Transactions, construction and signature checks

mod builder;
mod transaction;

pub use builder::*;
pub use transaction::*;
