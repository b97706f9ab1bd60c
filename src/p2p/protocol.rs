//! P2P protocol messages
//!
//! Every frame is `MAGIC | u32 LE length | JSON payload`. The first frame a
//! dialer sends is a `Handshake`; everything after it is a `Message`.

use crate::consensus::Block;
use crate::constants::{MAX_MESSAGE_SIZE, PROTOCOL_MAGIC};
use crate::validation::Tx;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame header size: magic + length
pub const HEADER_SIZE: usize = 8;

/// Peer protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid network magic")]
    BadMagic,
    #[error("Message too large: {0} bytes")]
    TooLarge(usize),
    #[error("Incomplete message")]
    Incomplete,
    #[error("Undecodable payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Malformed peer announcement: {0}")]
    MalformedAnnouncement(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// P2P message types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload")]
pub enum Message {
    /// Sender's newest block, starts reconciliation
    NewestBlock(Block),
    /// Ask for the whole chain
    AllBlocksRequest,
    /// Whole chain, newest first
    AllBlocksResponse(Vec<Block>),
    /// Freshly mined block
    NewBlockNotify(Block),
    /// Freshly admitted transaction
    NewTxNotify(Tx),
    /// `address:port:openPort` of a peer to connect to
    NewPeerNotify(String),
}

/// First frame on a dialed connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Port the dialer accepts connections on
    pub open_port: u16,
}

impl Message {
    /// Serialize message to a frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(self)
    }

    /// Deserialize message from a frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_frame(bytes)
    }

    /// Get the kind name for this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NewestBlock(_) => "NewestBlock",
            Message::AllBlocksRequest => "AllBlocksRequest",
            Message::AllBlocksResponse(_) => "AllBlocksResponse",
            Message::NewBlockNotify(_) => "NewBlockNotify",
            Message::NewTxNotify(_) => "NewTxNotify",
            Message::NewPeerNotify(_) => "NewPeerNotify",
        }
    }
}

fn frame(payload: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(payload.len()));
    }
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&PROTOCOL_MAGIC);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Check the header and return the payload length
fn parse_header(header: &[u8]) -> Result<usize, ProtocolError> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::Incomplete);
    }
    if header[0..4] != PROTOCOL_MAGIC {
        return Err(ProtocolError::BadMagic);
    }
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(length));
    }
    Ok(length)
}

/// Encode any record as one frame
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    frame(serde_json::to_vec(value)?)
}

/// Decode one complete frame
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let length = parse_header(bytes)?;
    if bytes.len() < HEADER_SIZE + length {
        return Err(ProtocolError::Incomplete);
    }
    Ok(serde_json::from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + length])?)
}

/// Write one record as a frame
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode_frame(value)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` when the stream closes cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let length = parse_header(&header)?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

/// A peer relayed in `NewPeerNotify`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAnnouncement {
    /// Address of the new peer
    pub address: String,
    /// Listening port of the new peer
    pub port: u16,
    /// Our own listening port, as the announcer knows it
    pub open_port: u16,
}

impl fmt::Display for PeerAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.port, self.open_port)
    }
}

impl FromStr for PeerAnnouncement {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedAnnouncement(s.to_string());
        // address may itself contain ':' (IPv6), so split from the right
        let mut parts = s.rsplitn(3, ':');
        let open_port = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        let port = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        let address = parts
            .next()
            .filter(|a| !a.is_empty())
            .ok_or_else(malformed)?
            .to_string();

        Ok(Self {
            address,
            port,
            open_port,
        })
    }
}
