//! Unspent output scan
//!
//! Nothing here is stored: spendable outputs are derived on demand from a
//! snapshot of the chain (newest first) and the inputs claimed by pending
//! transactions.

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::validation::{Tx, UTxOut};
use std::collections::{HashMap, HashSet};

/// Key for an output: (tx id, output index)
pub type OutPoint = (Hash, i32);

/// Every transaction on the chain by id
pub fn index_transactions(blocks: &[Block]) -> HashMap<Hash, &Tx> {
    blocks
        .iter()
        .flat_map(|b| b.transactions.iter())
        .map(|tx| (tx.id, tx))
        .collect()
}

/// Outputs of `address` spent by a confirmed input
fn spent_outputs_of(blocks: &[Block], index: &HashMap<Hash, &Tx>, address: &str) -> HashSet<OutPoint> {
    let mut spent = HashSet::new();
    for tx in blocks.iter().flat_map(|b| b.transactions.iter()) {
        for input in tx.tx_ins.iter().filter(|i| !i.is_coinbase()) {
            let owned = index
                .get(&input.tx_id)
                .and_then(|prev| prev.output(input.index))
                .map_or(false, |out| out.address == address);
            if owned {
                spent.insert((input.tx_id, input.index));
            }
        }
    }
    spent
}

/// Spendable outputs of `address`, in scan order (newest block first).
///
/// An output is spendable when it is confirmed, not referenced by any
/// confirmed input and not claimed by a pending input.
pub fn unspent_outputs_of(
    blocks: &[Block],
    pending_inputs: &HashSet<OutPoint>,
    address: &str,
) -> Vec<UTxOut> {
    let index = index_transactions(blocks);
    let spent = spent_outputs_of(blocks, &index, address);

    let mut unspent = Vec::new();
    for tx in blocks.iter().flat_map(|b| b.transactions.iter()) {
        for (i, output) in tx.tx_outs.iter().enumerate() {
            if output.address != address {
                continue;
            }
            let point = (tx.id, i as i32);
            if spent.contains(&point) || pending_inputs.contains(&point) {
                continue;
            }
            unspent.push(UTxOut {
                tx_id: tx.id,
                index: point.1,
                amount: output.amount,
            });
        }
    }
    unspent
}

/// Sum of every spendable output of `address`
pub fn balance_of(blocks: &[Block], pending_inputs: &HashSet<OutPoint>, address: &str) -> u64 {
    unspent_outputs_of(blocks, pending_inputs, address)
        .iter()
        .fold(0u64, |total, u| total.saturating_add(u.amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{TxIn, TxOut};

    fn block_of(height: u64, txs: Vec<Tx>) -> Block {
        let mut block = Block::new(Hash::zero(), height, 0, txs);
        block.hash = block.compute_hash();
        block
    }

    fn pay(prev: &Tx, index: i32, outs: &[(&str, u64)], ts: u64) -> Tx {
        Tx::new(
            ts,
            vec![TxIn {
                tx_id: prev.id,
                index,
                signature: "sig".to_string(),
            }],
            outs.iter()
                .map(|(a, v)| TxOut {
                    address: a.to_string(),
                    amount: *v,
                })
                .collect(),
        )
    }

    #[test]
    fn test_coinbase_balance() {
        let blocks = vec![block_of(1, vec![Tx::coinbase_at("alice", 1, 1)])];
        assert_eq!(balance_of(&blocks, &HashSet::new(), "alice"), 50);
        assert_eq!(balance_of(&blocks, &HashSet::new(), "bob"), 0);
    }

    #[test]
    fn test_spent_output_is_excluded() {
        let reward = Tx::coinbase_at("alice", 1, 1);
        let spend = pay(&reward, 0, &[("alice", 20), ("bob", 30)], 2);
        let blocks = vec![block_of(2, vec![spend.clone()]), block_of(1, vec![reward])];

        let alice = unspent_outputs_of(&blocks, &HashSet::new(), "alice");
        assert_eq!(alice, vec![UTxOut { tx_id: spend.id, index: 0, amount: 20 }]);
        assert_eq!(balance_of(&blocks, &HashSet::new(), "bob"), 30);
    }

    #[test]
    fn test_spending_one_output_leaves_siblings() {
        // alice owns two outputs of the same tx and spends only the second
        let reward = Tx::coinbase_at("minter", 1, 1);
        let split = pay(&reward, 0, &[("alice", 10), ("alice", 40)], 2);
        let spend = pay(&split, 1, &[("carol", 40)], 3);
        let blocks = vec![
            block_of(3, vec![spend]),
            block_of(2, vec![split.clone()]),
            block_of(1, vec![reward]),
        ];

        let alice = unspent_outputs_of(&blocks, &HashSet::new(), "alice");
        assert_eq!(alice, vec![UTxOut { tx_id: split.id, index: 0, amount: 10 }]);
    }

    #[test]
    fn test_pending_inputs_are_excluded() {
        let reward = Tx::coinbase_at("alice", 1, 1);
        let blocks = vec![block_of(1, vec![reward.clone()])];
        let pending: HashSet<OutPoint> = [(reward.id, 0)].into_iter().collect();

        assert!(unspent_outputs_of(&blocks, &pending, "alice").is_empty());
    }

    #[test]
    fn test_scan_order_is_newest_first() {
        let first = Tx::coinbase_at("alice", 1, 1);
        let second = Tx::coinbase_at("alice", 2, 2);
        let blocks = vec![block_of(2, vec![second.clone()]), block_of(1, vec![first.clone()])];

        let ids: Vec<Hash> = unspent_outputs_of(&blocks, &HashSet::new(), "alice")
            .into_iter()
            .map(|u| u.tx_id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_same_second_rewards_are_spent_independently() {
        let first = Tx::coinbase_at("alice", 1, 100);
        let second = Tx::coinbase_at("alice", 2, 100);
        let spend = pay(&first, 0, &[("bob", 50)], 101);
        let blocks = vec![
            block_of(3, vec![spend]),
            block_of(2, vec![second.clone()]),
            block_of(1, vec![first]),
        ];

        let alice = unspent_outputs_of(&blocks, &HashSet::new(), "alice");
        assert_eq!(alice, vec![UTxOut { tx_id: second.id, index: 0, amount: 50 }]);
        assert_eq!(balance_of(&blocks, &HashSet::new(), "bob"), 50);
    }

    #[test]
    fn test_balance_saturates_on_huge_outputs() {
        let reward = Tx::coinbase_at("minter", 1, 1);
        let split = pay(&reward, 0, &[("alice", u64::MAX), ("alice", u64::MAX)], 2);
        let blocks = vec![block_of(2, vec![split]), block_of(1, vec![reward])];

        assert_eq!(balance_of(&blocks, &HashSet::new(), "alice"), u64::MAX);
    }
}
