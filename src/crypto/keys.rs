//! ECDSA key handling
//!
//! secp256k1 ECDSA via k256. An address is the hex of the uncompressed
//! public point without its 0x04 tag (x || y, 64 bytes). Signatures travel
//! as hex of the fixed-size r || s encoding.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// Key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Restore from the 32-byte scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| KeyError::InvalidPrivateKey)
    }

    /// Export the 32-byte scalar
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    /// Hex address of the matching public key
    pub fn address(&self) -> String {
        let point = self.0.verifying_key().to_encoded_point(false);
        hex::encode(&point.as_bytes()[1..])
    }
}

/// Sign the bytes behind `message_hex`, returning the hex signature
pub fn sign(message_hex: &str, key: &PrivateKey) -> Result<String, KeyError> {
    let message = hex::decode(message_hex)?;
    let signature: Signature = key.0.sign(&message);
    Ok(hex::encode(signature.to_bytes()))
}

/// Check `signature_hex` over `message_hex` against the key behind `address_hex`.
///
/// Any malformed input verifies as false.
pub fn verify(signature_hex: &str, message_hex: &str, address_hex: &str) -> bool {
    let (Ok(signature), Ok(message), Ok(point)) = (
        hex::decode(signature_hex),
        hex::decode(message_hex),
        hex::decode(address_hex),
    ) else {
        return false;
    };

    if point.len() != 64 {
        return false;
    }
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&point);

    let verifying_key = match VerifyingKey::from_sec1_bytes(&sec1) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(&signature) {
        Ok(s) => s,
        Err(_) => return false,
    };

    verifying_key.verify(&message, &signature).is_ok()
}
