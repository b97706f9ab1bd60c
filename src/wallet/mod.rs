//! Wallet module - Local key and the signing seam used by the ledger

mod wallet;

pub use wallet::*;

use crate::crypto::KeyError;

/// Signing collaborator.
///
/// Transaction construction signs through this trait and validation verifies
/// through it, so tests and alternative key stores can plug in.
pub trait SigningService: Send + Sync {
    /// Hex address of the local key
    fn address(&self) -> &str;

    /// Sign the bytes behind `message_hex` with the local key
    fn sign(&self, message_hex: &str) -> Result<String, KeyError>;

    /// Verify a signature against the key behind `address_hex`
    fn verify(&self, signature_hex: &str, message_hex: &str, address_hex: &str) -> bool {
        crate::crypto::verify(signature_hex, message_hex, address_hex)
    }
}
