//! Cryptography module - SHA-256 content hashing and ECDSA keys

mod hash;
mod keys;

pub use hash::*;
pub use keys::*;
