//! Property-based and end-to-end tests for the MSSP ledger
//!
//! These tests drive the public API the way the node binary does: chains over
//! in-memory stores, real mining at low difficulty, and two nodes talking over
//! loopback TCP.

use mssp_core::consensus::{calculate_next_difficulty, meets_difficulty, Block};
use mssp_core::constants::{MINER_REWARD, MIN_DIFFICULTY};
use mssp_core::crypto::{hash_bytes, CanonicalEncoder, Hash};
use mssp_core::mempool::Mempool;
use mssp_core::mining::{Miner, MiningResult};
use mssp_core::node::{Blockchain, Node};
use mssp_core::p2p::{self, decode_frame, encode_frame, read_frame, write_frame, Handshake, Message};
use mssp_core::storage::MemoryStore;
use mssp_core::validation::{Tx, TxIn, TxOut};
use mssp_core::wallet::{SigningService, Wallet};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

fn chain_for(wallet: &Wallet) -> (Blockchain, Arc<Mempool>) {
    let mempool = Arc::new(Mempool::new());
    let chain = Blockchain::open(Arc::new(MemoryStore::new()), Arc::clone(&mempool), wallet.address()).unwrap();
    (chain, mempool)
}

fn node() -> Node {
    Node::new(Arc::new(MemoryStore::new()), Arc::new(Wallet::generate()), 0).unwrap()
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A mined hash always carries the requested zero prefix
    #[test]
    fn prop_mined_hash_meets_difficulty(difficulty in 0u32..=2, height in 1u64..1000) {
        let block = Block::new(hash_bytes(&height.to_be_bytes()), height, difficulty, vec![Tx::coinbase_at("miner", height, 1)]);
        match Miner::new().mine_block(block, 0, |_| {}) {
            MiningResult::Success(mined) => {
                prop_assert!(mined.is_mined());
                prop_assert!(mined.hash.to_hex().starts_with(&"0".repeat(difficulty as usize)));
            }
            MiningResult::Interrupted => prop_assert!(false, "mining was never stopped"),
        }
    }

    /// Difficulty moves at most one step per retarget and never below the floor
    #[test]
    fn prop_retarget_is_bounded(current in 1u32..64, first in 0u64..1_000_000, elapsed in 0u64..100_000) {
        let next = calculate_next_difficulty(current, first, first + elapsed);
        prop_assert!(next >= MIN_DIFFICULTY);
        prop_assert!(next + 1 >= current && next <= current + 1);
    }

    /// Transaction ids ignore signatures
    #[test]
    fn prop_tx_id_ignores_signature(sig_a in "[0-9a-f]{0,64}", sig_b in "[0-9a-f]{0,64}", amount in 1u64..1_000) {
        let build = |signature: String| {
            Tx::new(
                7,
                vec![TxIn { tx_id: hash_bytes(b"funding"), index: 0, signature }],
                vec![TxOut { address: "bob".to_string(), amount }],
            )
        };
        let a = build(sig_a);
        let b = build(sig_b);
        prop_assert_eq!(a.id, b.id);
        prop_assert_eq!(a.compute_id(), a.id);
    }

    /// Length-prefixed strings keep distinct field splits distinct
    #[test]
    fn prop_canonical_strings_do_not_collide(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let joined = format!("{a}{b}");
        let mut split = CanonicalEncoder::new();
        split.put_str(&a).put_str(&b);
        let mut whole = CanonicalEncoder::new();
        whole.put_str(&joined).put_str("");
        prop_assert_ne!(split.digest(), whole.digest());
    }

    /// Frames decode back to the same message whatever the payload
    #[test]
    fn prop_frame_carries_notify(payload in "[ -~]{0,64}") {
        let message = Message::NewPeerNotify(payload);
        let frame = encode_frame(&message).unwrap();
        let decoded: Message = decode_frame(&frame).unwrap();
        prop_assert_eq!(decoded, message);
        prop_assert!(decode_frame::<Message>(&frame[..frame.len() - 1]).is_err());
    }

    /// Draining always empties the pool and puts the reward last
    #[test]
    fn prop_drain_puts_coinbase_last(count in 0usize..8) {
        let pool = Mempool::new();
        for i in 0..count {
            pool.insert(Tx::new(i as u64, vec![], vec![TxOut { address: format!("a{i}"), amount: 1 }]));
        }
        let drained = pool.drain_for_block("miner", 2);
        prop_assert!(pool.is_empty());
        prop_assert_eq!(drained.len(), count + 1);
        prop_assert!(drained.last().unwrap().is_coinbase());
        prop_assert_eq!(drained.iter().filter(|tx| tx.is_coinbase()).count(), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    /// Walking from the head visits every height once and ends at a genesis
    #[test]
    fn prop_chain_walk_is_linked(extra in 0usize..3) {
        let wallet = Wallet::generate();
        let (chain, _) = chain_for(&wallet);
        for _ in 0..extra {
            chain.grow(wallet.address()).unwrap();
        }

        let blocks = chain.blocks_from_newest().unwrap();
        prop_assert_eq!(blocks.len(), extra + 1);
        let heights: Vec<u64> = blocks.iter().map(|b| b.height).collect();
        let expected: Vec<u64> = (1..=(extra as u64 + 1)).rev().collect();
        prop_assert_eq!(heights, expected);
        for pair in blocks.windows(2) {
            prop_assert_eq!(pair[0].prev_hash, pair[1].hash);
        }
        prop_assert!(blocks.last().unwrap().is_genesis());
        prop_assert!(blocks.iter().all(|b| meets_difficulty(&b.hash, b.difficulty)));
    }
}

// ============================================================================
// CHAIN SCENARIOS
// ============================================================================

#[test]
fn test_fresh_chain_pays_the_miner() {
    let wallet = Wallet::generate();
    let (chain, mempool) = chain_for(&wallet);

    let state = chain.state();
    assert_eq!(state.height, 1);
    assert_eq!(chain.balance(wallet.address()).unwrap(), MINER_REWARD);
    assert_eq!(chain.newest_block().unwrap().hash, state.newest_hash);
    assert!(mempool.is_empty());
}

#[test]
fn test_payment_confirms_with_change() {
    let wallet = Wallet::generate();
    let (chain, mempool) = chain_for(&wallet);

    let tx = chain.build_transaction("bob", 30, &wallet).unwrap();
    mempool.insert(tx.clone());
    // pending input hides the only output
    assert_eq!(chain.balance(wallet.address()).unwrap(), 0);

    let block = chain.grow(wallet.address()).unwrap();
    assert!(block.tx_ids().any(|id| id == tx.id));
    assert_eq!(chain.balance("bob").unwrap(), 30);
    assert_eq!(chain.balance(wallet.address()).unwrap(), 20 + MINER_REWARD);
    assert!(mempool.is_empty());
}

#[test]
fn test_replace_is_idempotent() {
    let wallet = Wallet::generate();
    let (source, _) = chain_for(&wallet);
    source.grow(wallet.address()).unwrap();
    let blocks = source.blocks_from_newest().unwrap();

    let (target, _) = chain_for(&Wallet::generate());
    target.replace(&blocks).unwrap();
    let first = target.state();
    target.replace(&blocks).unwrap();

    assert_eq!(target.state(), first);
    assert_eq!(target.blocks_from_newest().unwrap(), blocks);
}

#[test]
fn test_peer_block_confirms_pending_tx() {
    let wallet = Wallet::generate();
    let (source, _) = chain_for(&wallet);
    let (target, target_pool) = chain_for(&Wallet::generate());
    target.replace(&source.blocks_from_newest().unwrap()).unwrap();

    let tx = source.build_transaction("carol", 10, &wallet).unwrap();
    target_pool.admit_from_peer(tx.clone());

    // mine the block on a chain that shares the head
    let (miner_chain, miner_pool) = chain_for(&wallet);
    miner_chain.replace(&source.blocks_from_newest().unwrap()).unwrap();
    miner_pool.insert(tx.clone());
    let block = miner_chain.grow(wallet.address()).unwrap();

    target.append_peer_block(&block).unwrap();
    assert_eq!(target.state().height, 2);
    assert_eq!(target.state().newest_hash, block.hash);
    assert!(!target_pool.contains(&tx.id));
    assert_eq!(target.balance("carol").unwrap(), 10);
}

#[test]
fn test_unknown_lookups() {
    let (chain, _) = chain_for(&Wallet::generate());
    assert!(chain.find_block(&Hash::zero()).is_err());
    assert_eq!(chain.find_transaction(&hash_bytes(b"missing")).unwrap(), None);
}

// ============================================================================
// NETWORK SCENARIOS
// ============================================================================

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// A node serving P2P on a loopback port it also announces as its own
async fn listening_node() -> (Node, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let node = Node::new(Arc::new(MemoryStore::new()), Arc::new(Wallet::generate()), port).unwrap();
    tokio::spawn(p2p::serve(node.clone(), listener));
    (node, port)
}

#[tokio::test]
async fn test_shorter_node_adopts_longer_chain_over_tcp() {
    let long = node();
    long.add_local_block().await.unwrap();
    long.add_local_block().await.unwrap();

    let short = node();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(p2p::serve(short.clone(), listener));

    long.connect_to_peer("127.0.0.1", port).await.unwrap();

    let target = long.chain_status().newest_hash;
    assert!(wait_for(|| short.chain_status().newest_hash == target).await);
    assert_eq!(short.chain_status().height, 3);
    assert_eq!(short.get_blocks().unwrap(), long.get_blocks().unwrap());
}

#[tokio::test]
async fn test_new_block_and_tx_relay_over_tcp() {
    let dialer = node();
    let acceptor = node();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(p2p::serve(acceptor.clone(), listener));

    dialer.connect_to_peer("127.0.0.1", port).await.unwrap();
    let head = dialer.chain_status().newest_hash;
    assert!(wait_for(|| acceptor.chain_status().newest_hash == head).await);
    assert_eq!(acceptor.list_peers().len(), 1);

    let tx = dialer.submit_transaction("dave", 5).unwrap();
    assert!(wait_for(|| acceptor.mempool().iter().any(|pending| pending.id == tx.id)).await);

    let block = dialer.add_local_block().await.unwrap();
    assert!(wait_for(|| acceptor.chain_status().newest_hash == block.hash).await);
    assert!(wait_for(|| acceptor.mempool().is_empty()).await);
    assert_eq!(acceptor.balance("dave").unwrap(), 5);
}

#[tokio::test]
async fn test_announced_peer_is_dialed_by_existing_peers() {
    let (hub, hub_port) = listening_node().await;
    let (old, old_port) = listening_node().await;
    let (new, new_port) = listening_node().await;

    hub.connect_to_peer("127.0.0.1", old_port).await.unwrap();
    let hub_key = format!("127.0.0.1:{hub_port}");
    assert!(wait_for(|| old.list_peers().contains(&hub_key)).await);

    // hub tells `old` about `new`, and `old` connects on its own
    hub.connect_to_peer("127.0.0.1", new_port).await.unwrap();
    let new_key = format!("127.0.0.1:{new_port}");
    let old_key = format!("127.0.0.1:{old_port}");
    assert!(wait_for(|| old.list_peers().contains(&new_key)).await);
    assert!(wait_for(|| new.list_peers().contains(&old_key)).await);
    assert_eq!(new.list_peers().len(), 2);
}

#[tokio::test]
async fn test_misbehaving_peer_is_disconnected_alone() {
    let (node, port) = listening_node().await;

    let good = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (_good_reader, mut good_writer) = good.into_split();
    write_frame(&mut good_writer, &Handshake { open_port: 7001 }).await.unwrap();

    let bad = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (mut bad_reader, mut bad_writer) = bad.into_split();
    write_frame(&mut bad_writer, &Handshake { open_port: 7002 }).await.unwrap();
    assert!(wait_for(|| node.list_peers().len() == 2).await);

    // an empty chain is not a valid reply
    write_frame(&mut bad_writer, &Message::AllBlocksResponse(vec![])).await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), read_frame::<_, Message>(&mut bad_reader))
        .await
        .unwrap();
    assert!(matches!(closed, Ok(None)));
    assert!(wait_for(|| node.list_peers() == vec!["127.0.0.1:7001".to_string()]).await);
    assert_eq!(node.chain_status().height, 1);
}
