//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636. Every OAuth session carries its own verifier and
//! state; the challenge travels in the authorization URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of random bytes behind verifiers and state tokens (43 base64url chars).
const RANDOM_TOKEN_BYTES: usize = 32;

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..RANDOM_TOKEN_BYTES).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Generate a cryptographically secure code verifier
///
/// Per RFC 7636, verifiers must be 43-128 characters long.
pub fn generate_code_verifier() -> String {
    random_token()
}

/// BASE64URL(SHA256(ASCII(code_verifier)))
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF protection
pub fn generate_state() -> String {
    random_token()
}

/// Compare two secrets without an early exit on the first differing byte.
///
/// Lengths are not hidden; state tokens and verifiers have a fixed length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

/// PKCE material for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept secret until token exchange
    pub code_verifier: String,
    /// Sent in the authorization request
    pub code_challenge: String,
    /// Must match between authorization request and callback
    pub state: String,
}

impl PkceChallenge {
    /// # Examples
    /// ```
    /// use hearthsync_common::auth::PkceChallenge;
    ///
    /// let challenge = PkceChallenge::generate();
    /// assert!(challenge.code_verifier.len() >= 43);
    /// assert_eq!(challenge.challenge_method(), "S256");
    /// ```
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self { code_verifier, code_challenge, state: generate_state() }
    }

    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}
