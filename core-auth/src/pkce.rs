//! PKCE (RFC 7636) helpers
//!
//! The verifier comes from the operating system's secure random source. The
//! state only has to be unique per attempt, so a timestamp plus a short
//! random suffix is enough.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

const VERIFIER_BYTES: usize = 32;
const STATE_SUFFIX_LEN: usize = 16;

/// Generate a PKCE code verifier: 32 secure random bytes, base64url without
/// padding (43 characters).
///
/// # Errors
///
/// `AuthError::CryptoUnavailable` if the OS random source fails. There is no
/// weaker fallback.
pub fn generate_code_verifier() -> Result<String> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| AuthError::CryptoUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// S256 challenge: `BASE64URL(SHA256(verifier))` without padding.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Correlation state for one login attempt.
#[must_use]
pub fn generate_state(timestamp_millis: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", timestamp_millis, suffix)
}

/// A single live login attempt.
///
/// Holds the raw verifier that is resent on token exchange, the challenge
/// derived from it, and the state round-tripped through the redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceAttempt {
    code_verifier: String,
    code_challenge: String,
    state: String,
}

impl PkceAttempt {
    /// Create a fresh attempt.
    pub fn generate(timestamp_millis: i64) -> Result<Self> {
        let code_verifier = generate_code_verifier()?;
        Ok(Self::from_verifier(code_verifier, generate_state(timestamp_millis)))
    }

    pub(crate) fn from_verifier(code_verifier: String, state: String) -> Self {
        let code_challenge = generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            state,
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Exact comparison against a redirect's `state`.
    pub fn matches_state(&self, state: &str) -> bool {
        self.state == state
    }
}

impl fmt::Debug for PkceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceAttempt")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .field("state", &self.state)
            .finish()
    }
}
