//! Consensus module - Block structure and difficulty retargeting

mod block;
mod difficulty;

pub use block::*;
pub use difficulty::*;
