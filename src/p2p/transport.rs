//! TCP transport
//!
//! One reader task and one writer task per connection. The reader dispatches
//! frames strictly in arrival order; the writer drains the peer's outbound
//! queue strictly in enqueue order.

use super::protocol::{read_frame, write_frame, Handshake, Message, ProtocolError};
use crate::node::{Node, NodeError};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Accept peers on `port` until the listener fails
pub async fn listen(node: Node, port: u16) -> Result<(), NodeError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(ProtocolError::from)?;
    serve(node, listener).await
}

/// Accept peers on an already bound listener
pub async fn serve(node: Node, listener: TcpListener) -> Result<(), NodeError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "P2P listening");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = accept(node, stream, addr).await {
                        warn!(%addr, error = %e, "Inbound connection rejected");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
            }
        }
    }
}

/// Read the dialer's handshake and register it as `ip:open_port`
async fn accept(node: Node, stream: TcpStream, addr: SocketAddr) -> Result<(), ProtocolError> {
    let (mut reader, writer) = stream.into_split();
    let handshake: Handshake = read_frame(&mut reader)
        .await?
        .ok_or(ProtocolError::Incomplete)?;

    let key = format!("{}:{}", addr.ip(), handshake.open_port);
    start_peer(&node, key, reader, writer);
    Ok(())
}

/// Connect to `address:port`, announcing `open_port` as our listening port.
///
/// Returns the key the peer is registered under.
pub async fn dial(node: &Node, address: &str, port: u16, open_port: u16) -> Result<String, NodeError> {
    let stream = TcpStream::connect((address, port))
        .await
        .map_err(ProtocolError::from)?;
    let (reader, mut writer) = stream.into_split();
    write_frame(&mut writer, &Handshake { open_port }).await?;

    let key = format!("{}:{}", address, port);
    debug!(peer = %key, open_port, "Dialed peer");
    start_peer(node, key.clone(), reader, writer);
    Ok(key)
}

fn start_peer(node: &Node, key: String, reader: OwnedReadHalf, writer: OwnedWriteHalf) {
    let (outbound, queue) = unbounded_channel();
    let conn_id = node.on_peer_connected(&key, outbound);

    tokio::spawn(write_loop(key.clone(), writer, queue));
    tokio::spawn(read_loop(node.clone(), key, conn_id, reader));
}

async fn write_loop(key: String, mut writer: OwnedWriteHalf, mut queue: UnboundedReceiver<Message>) {
    while let Some(message) = queue.recv().await {
        if let Err(e) = write_frame(&mut writer, &message).await {
            warn!(peer = %key, error = %e, "Write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!(peer = %key, "Writer stopped");
}

async fn read_loop(node: Node, key: String, conn_id: u64, mut reader: OwnedReadHalf) {
    loop {
        match read_frame::<_, Message>(&mut reader).await {
            Ok(Some(message)) => {
                if let Err(e) = node.on_message_received(&key, message).await {
                    if e.is_peer_fault() {
                        warn!(peer = %key, error = %e, "Closing peer");
                        break;
                    }
                    warn!(peer = %key, error = %e, "Message handling failed");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %key, error = %e, "Closing peer");
                break;
            }
        }
    }
    // dropping the peer's sender ends its writer
    node.on_peer_disconnected(&key, conn_id);
}
