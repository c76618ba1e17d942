//! Opaque token helpers: random one-time tokens and storage digests.

use rand::{RngCore, rng};
use sha2::{Digest, Sha256};

/// Generate a random one-time token (32 bytes, hex encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
