//! Wallet implementation
//!
//! Holds the node's single signing key. The key is loaded (or created and
//! persisted) once at startup and never mutated afterwards.

use crate::crypto::{KeyError, PrivateKey};
use crate::wallet::SigningService;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet file error: {0}")]
    Io(#[from] io::Error),
    #[error("Wallet key error: {0}")]
    Key(#[from] KeyError),
}

/// The local wallet
#[derive(Debug, Clone)]
pub struct Wallet {
    key: PrivateKey,
    address: String,
}

impl Wallet {
    /// Wallet around a freshly generated key (not persisted)
    pub fn generate() -> Self {
        Self::from_key(PrivateKey::generate())
    }

    /// Wallet around an existing key
    pub fn from_key(key: PrivateKey) -> Self {
        let address = key.address();
        Self { key, address }
    }

    /// Restore the key stored at `path`, or create and persist a new one
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref();
        if path.exists() {
            let bytes = fs::read(path)?;
            let wallet = Self::from_key(PrivateKey::from_bytes(&bytes)?);
            info!(path = %path.display(), address = %wallet.address, "Restored wallet");
            return Ok(wallet);
        }

        let wallet = Self::generate();
        wallet.save(path)?;
        info!(path = %path.display(), address = %wallet.address, "Created wallet");
        Ok(wallet)
    }

    /// Persist the private key
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        fs::write(path, self.key.to_bytes())?;
        Ok(())
    }
}

impl SigningService for Wallet {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign(&self, message_hex: &str) -> Result<String, KeyError> {
        crate::crypto::sign(message_hex, &self.key)
    }
}
