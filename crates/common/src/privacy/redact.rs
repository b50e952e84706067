//! Salted one-way hashing for identifiers that appear in logs.
//!
//! Account ids are usually email addresses; logs keep a stable short hash so
//! repeated failures for one account can still be correlated.

use sha2::{Digest, Sha256};

const IDENTIFIER_HASH_SALT: &[u8] = b"hearthsync-log-identifier-salt";

/// Returns `id_hash=<16 hex chars>` for `value`.
pub fn redact_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(IDENTIFIER_HASH_SALT);
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    format!("id_hash={}", hex::encode(&digest[..8]))
}
