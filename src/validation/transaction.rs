//! Transaction structure and validation
//!
//! UTXO-style transactions. A transaction carries one signature over its id,
//! copied into every input.

use crate::constants::{COINBASE_INDEX, COINBASE_SIGNATURE, MINER_REWARD};
use crate::crypto::{CanonicalEncoder, Hash, KeyError};
use crate::wallet::SigningService;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Transaction errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Unknown reference: transaction {0} is not on the chain")]
    UnknownReference(Hash),
    #[error("Invalid signature on input spending {0}")]
    InvalidSignature(Hash),
    #[error("Signing failed: {0}")]
    Signing(#[from] KeyError),
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    /// Id of the transaction holding the spent output
    pub tx_id: Hash,
    /// Index of the output in that transaction
    pub index: i32,
    /// Hex signature, or the coinbase sentinel
    pub signature: String,
}

impl TxIn {
    pub fn is_coinbase(&self) -> bool {
        self.index == COINBASE_INDEX && self.signature == COINBASE_SIGNATURE
    }
}

/// A transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOut {
    /// Hex address of the recipient
    pub address: String,
    pub amount: u64,
}

/// An output not yet spent on the chain nor claimed by a pending input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UTxOut {
    pub tx_id: Hash,
    pub index: i32,
    pub amount: u64,
}

/// A complete transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub id: Hash,
    pub timestamp: u64,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Tx {
    /// Create a transaction and assign its id
    pub fn new(timestamp: u64, tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            id: Hash::zero(),
            timestamp,
            tx_ins,
            tx_outs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Reward transaction crediting `address` for the block at `height`
    pub fn coinbase(address: &str, height: u64) -> Self {
        Self::coinbase_at(address, height, unix_now())
    }

    /// Reward transaction with an explicit timestamp.
    ///
    /// The input references the block height instead of a transaction, so
    /// two rewards to one address in the same second still differ in id.
    pub fn coinbase_at(address: &str, height: u64, timestamp: u64) -> Self {
        Self::new(
            timestamp,
            vec![TxIn {
                tx_id: coinbase_reference(height),
                index: COINBASE_INDEX,
                signature: COINBASE_SIGNATURE.to_string(),
            }],
            vec![TxOut {
                address: address.to_string(),
                amount: MINER_REWARD,
            }],
        )
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].is_coinbase()
    }

    /// Identity hash over timestamp, input references and outputs.
    ///
    /// Signatures are left out so the id can be recomputed after signing.
    pub fn compute_id(&self) -> Hash {
        let mut enc = CanonicalEncoder::new();
        enc.put_u64(self.timestamp);

        enc.put_u32(self.tx_ins.len() as u32);
        for input in &self.tx_ins {
            enc.put_hash(&input.tx_id).put_i32(input.index);
        }

        enc.put_u32(self.tx_outs.len() as u32);
        for output in &self.tx_outs {
            enc.put_str(&output.address).put_u64(output.amount);
        }

        enc.digest()
    }

    /// Full encoding, signatures included, for the enclosing block hash
    pub fn encode_into(&self, enc: &mut CanonicalEncoder) {
        enc.put_hash(&self.id).put_u64(self.timestamp);

        enc.put_u32(self.tx_ins.len() as u32);
        for input in &self.tx_ins {
            enc.put_hash(&input.tx_id)
                .put_i32(input.index)
                .put_str(&input.signature);
        }

        enc.put_u32(self.tx_outs.len() as u32);
        for output in &self.tx_outs {
            enc.put_str(&output.address).put_u64(output.amount);
        }
    }

    /// Output at `index`, if the index is in range
    pub fn output(&self, index: i32) -> Option<&TxOut> {
        usize::try_from(index).ok().and_then(|i| self.tx_outs.get(i))
    }

    /// Sign every input with the same signature over the id
    pub fn sign(&mut self, signer: &dyn SigningService) -> Result<(), TxError> {
        let signature = signer.sign(&self.id.to_hex())?;
        for input in &mut self.tx_ins {
            input.signature = signature.clone();
        }
        Ok(())
    }
}

/// Height of the rewarded block, little-endian in the first 8 bytes
fn coinbase_reference(height: u64) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    Hash(bytes)
}

/// Validate every non-coinbase input.
///
/// `find_tx` resolves a transaction id against the chain. An input whose
/// referenced transaction (or output) is missing fails with
/// `UnknownReference`; one whose signature does not verify against the id and
/// the referenced output's address fails with `InvalidSignature`.
pub fn validate<F>(tx: &Tx, find_tx: F, signer: &dyn SigningService) -> Result<(), TxError>
where
    F: Fn(&Hash) -> Option<Tx>,
{
    let message = tx.id.to_hex();

    for input in tx.tx_ins.iter().filter(|i| !i.is_coinbase()) {
        let prev_tx = find_tx(&input.tx_id).ok_or(TxError::UnknownReference(input.tx_id))?;
        let output = prev_tx
            .output(input.index)
            .ok_or(TxError::UnknownReference(input.tx_id))?;

        if !signer.verify(&input.signature, &message, &output.address) {
            return Err(TxError::InvalidSignature(input.tx_id));
        }
    }

    Ok(())
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
