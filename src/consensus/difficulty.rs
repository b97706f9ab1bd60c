//! Difficulty adjustment algorithm
//!
//! Every `DIFFICULTY_INTERVAL` blocks the time spanned by the last interval
//! is compared to `DIFFICULTY_INTERVAL * BLOCK_INTERVAL_MINUTES`, give or take
//! `TIME_RANGE_MINUTES`, and the difficulty moves by one digit.

use crate::consensus::Block;
use crate::constants::{
    BLOCK_INTERVAL_MINUTES, DEFAULT_DIFFICULTY, DIFFICULTY_INTERVAL, MIN_DIFFICULTY,
    TIME_RANGE_MINUTES,
};
use crate::storage::ChainState;

/// Check if difficulty should be recalculated for the block after `height`
pub fn should_adjust_difficulty(height: u64) -> bool {
    height > 0 && height % DIFFICULTY_INTERVAL == 0
}

/// Difficulty for the next block on top of `state`.
///
/// `recent` is the chain newest-first; only the first
/// `DIFFICULTY_INTERVAL` entries are consulted, and only on retarget heights.
pub fn next_difficulty(state: &ChainState, recent: &[Block]) -> u32 {
    if state.height == 0 {
        return DEFAULT_DIFFICULTY;
    }
    if !should_adjust_difficulty(state.height) {
        return state.current_difficulty;
    }

    let window = DIFFICULTY_INTERVAL as usize;
    match (recent.first(), recent.get(window - 1)) {
        (Some(newest), Some(oldest)) => {
            calculate_next_difficulty(state.current_difficulty, oldest.timestamp, newest.timestamp)
        }
        _ => state.current_difficulty,
    }
}

/// Pure retarget step.
///
/// Elapsed time is measured in whole minutes (truncating). Slower than the
/// window lowers the difficulty, faster raises it, anything inside the
/// tolerance band keeps it.
pub fn calculate_next_difficulty(current: u32, first_block_time: u64, last_block_time: u64) -> u32 {
    let elapsed_minutes = last_block_time.saturating_sub(first_block_time) / 60;
    let expected = DIFFICULTY_INTERVAL * BLOCK_INTERVAL_MINUTES;

    if elapsed_minutes > expected + TIME_RANGE_MINUTES {
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    } else if elapsed_minutes < expected.saturating_sub(TIME_RANGE_MINUTES) {
        current + 1
    } else {
        current
    }
}
