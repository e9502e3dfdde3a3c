//! Flow-scoped random material: state tokens and PKCE pairs.
//!
//! OAuth does not prescribe a token format beyond "unguessable random
//! string", so entropy matters: everything here draws from the operating
//! system's CSPRNG (`OsRng`), never a statistically seeded generator.
//! PKCE follows RFC 7636 with the S256 challenge method.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Minimum length of an anti-forgery state token.
pub const STATE_TOKEN_LENGTH: usize = 30;

/// Generate a single-use anti-forgery state token.
///
/// Uniform alphanumeric alphabet, [`STATE_TOKEN_LENGTH`] characters, drawn
/// from the OS CSPRNG.
#[must_use]
pub fn generate_state_token() -> String {
    OsRng.sample_iter(&Alphanumeric).take(STATE_TOKEN_LENGTH).map(char::from).collect()
}

/// Per-flow PKCE verifier/challenge pair.
///
/// The verifier stays secret until the token exchange; the challenge is sent
/// in the authorization request. A fresh pair is generated for every flow and
/// persisted alongside the flow's state record so the exchange can replay it.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// 32 random bytes, base64url encoded (43 chars, within the RFC 7636
    /// 43-128 limit).
    pub verifier: String,
    /// `BASE64URL(SHA256(ASCII(verifier)))`.
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// Compute the S256 challenge for a verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// The challenge method sent to the provider (always S256).
    #[must_use]
    pub const fn method() -> &'static str {
        "S256"
    }
}
