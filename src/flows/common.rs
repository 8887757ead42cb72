//! Shared helpers for flow implementations (scopes, CSRF state generation and comparison).

// crates.io
use subtle::ConstantTimeEq;
// self
use crate::session;

/// Scopes requested by both grants.
pub const IDP_SCOPES: [&str; 3] = ["openid", "profile", "email"];

const STATE_BYTES: usize = 32;

/// Generates a CSRF state token: 32 random bytes, base64url without padding.
pub fn generate_state() -> String {
	session::random_token(STATE_BYTES)
}

/// Compares the stored and presented state without early exit on the first differing byte.
pub fn states_match(expected: &str, provided: &str) -> bool {
	expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
