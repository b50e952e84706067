//! OAuth 2.0 helpers shared by every provider adapter
//!
//! Only the PKCE primitives live here; the authorization flow itself is
//! orchestrated by `hearthsync-core` and the HTTP calls by `hearthsync-infra`.

pub mod pkce;

pub use pkce::{
    constant_time_eq, generate_code_challenge, generate_code_verifier, generate_state, PkceChallenge,
};
