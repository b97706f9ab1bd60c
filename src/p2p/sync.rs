//! Chain reconciliation
//!
//! Dispatches one inbound message from a peer. Replies are queued on that
//! peer's outbound queue; nothing here waits on the network.

use super::protocol::{Message, PeerAnnouncement};
use crate::node::{Node, NodeError};
use tracing::{debug, info, warn};

/// Handle a message received from peer `from`
pub async fn handle_message(node: &Node, from: &str, message: Message) -> Result<(), NodeError> {
    debug!(peer = %from, kind = message.kind(), "Received message");

    match message {
        Message::NewestBlock(remote) => {
            let local = node.newest_block()?;
            if remote.height >= local.height {
                debug!(peer = %from, remote = remote.height, local = local.height, "Requesting all blocks");
                node.peers().send_to(from, Message::AllBlocksRequest);
            } else {
                debug!(peer = %from, remote = remote.height, local = local.height, "Sending newest block");
                node.peers().send_to(from, Message::NewestBlock(local));
            }
        }
        Message::AllBlocksRequest => {
            let blocks = node.get_blocks()?;
            node.peers().send_to(from, Message::AllBlocksResponse(blocks));
        }
        Message::AllBlocksResponse(blocks) => {
            node.replace_chain(&blocks)?;
        }
        Message::NewBlockNotify(block) => {
            node.append_peer_block(&block)?;
        }
        Message::NewTxNotify(tx) => {
            node.admit_from_peer(tx);
        }
        Message::NewPeerNotify(payload) => {
            let announcement: PeerAnnouncement = payload.parse()?;
            info!(peer = %from, announced = %announcement, "Connecting to announced peer");

            // dial off the reader so this peer's messages keep flowing
            let node = node.clone();
            tokio::spawn(async move {
                if let Err(e) = node.connect_to_announced(&announcement).await {
                    warn!(announced = %announcement, error = %e, "Announced peer unreachable");
                }
            });
        }
    }

    Ok(())
}
